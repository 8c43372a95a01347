use std::fmt;

use crate::charset::Category;
use crate::pool::TaskFailure;

#[derive(Debug)]
pub enum FontSplitError {
    InvalidConfiguration(String),
    InvalidBudget { category: Category, requested: usize },
    DataUnavailable(String),
    Font(String),
    ResourceExhaustion(String),
    AllTasksFailed { failures: Vec<TaskFailure> },
    Stage {
        stage: Stage,
        source: Box<FontSplitError>,
    },
    Io(std::io::Error),
}

/// Pipeline stages in the order the orchestrator runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Partition,
    LoadFont,
    Plan,
    Dispatch,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Partition, Stage::LoadFont, Stage::Plan, Stage::Dispatch];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Partition => "partition",
            Stage::LoadFont => "load_font",
            Stage::Plan => "plan",
            Stage::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FontSplitError {
    pub(crate) fn in_stage(self, stage: Stage) -> Self {
        match self {
            FontSplitError::Stage { .. } => self,
            other => FontSplitError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage a fatal error was raised in, if it came out of the orchestrator.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            FontSplitError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Strips the stage wrapper.
    pub fn cause(&self) -> &FontSplitError {
        match self {
            FontSplitError::Stage { source, .. } => source.cause(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self.cause(),
            FontSplitError::InvalidConfiguration(_) | FontSplitError::InvalidBudget { .. }
        )
    }
}

impl fmt::Display for FontSplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontSplitError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            FontSplitError::InvalidBudget {
                category,
                requested,
            } => write!(
                f,
                "invalid configuration: chunk budget {} for non-empty category {}",
                requested, category
            ),
            FontSplitError::DataUnavailable(message) => {
                write!(f, "character data unavailable: {}", message)
            }
            FontSplitError::Font(message) => write!(f, "font error: {}", message),
            FontSplitError::ResourceExhaustion(message) => {
                write!(f, "resource exhausted: {}", message)
            }
            FontSplitError::AllTasksFailed { failures } => {
                write!(f, "all {} subset conversions failed", failures.len())?;
                if let Some(first) = failures.first() {
                    write!(f, " (first: {})", first)?;
                }
                Ok(())
            }
            FontSplitError::Stage { stage, source } => {
                write!(f, "stage {} failed: {}", stage, source)
            }
            FontSplitError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for FontSplitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FontSplitError::Io(err) => Some(err),
            FontSplitError::Stage { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FontSplitError {
    fn from(value: std::io::Error) -> Self {
        FontSplitError::Io(value)
    }
}
