use crate::CssOptions;
use crate::error::Stage;
use crate::glyph_report::CoverageReport;
use crate::pool::{PoolState, ResultDescriptor, TaskFailure, TaskOutcome};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// Dispatch finished but some subsets failed.
    Partial { failed: usize },
    Failed(String),
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Completed => f.write_str("completed"),
            StageOutcome::Partial { failed } => write!(f, "partial ({failed} failed)"),
            StageOutcome::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: Stage,
    pub start: Instant,
    pub end: Instant,
    pub outcome: StageOutcome,
}

impl StageRecord {
    pub fn elapsed(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// What the dispatch stage observed about its worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub capacity: usize,
    pub peak_active: usize,
    /// `None` when no pool was created because there was nothing to dispatch.
    pub final_state: Option<PoolState>,
}

/// Aggregate of one completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcomes: Vec<TaskOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub average_bytes: f64,
    pub stages: Vec<StageRecord>,
    pub coverage: CoverageReport,
    pub pool: PoolStats,
    pub css: CssOptions,
}

impl RunSummary {
    pub(crate) fn reduce(
        outcomes: Vec<TaskOutcome>,
        stages: Vec<StageRecord>,
        coverage: CoverageReport,
        pool: PoolStats,
        css: CssOptions,
    ) -> Self {
        let mut succeeded = 0;
        let mut total_bytes = 0u64;
        for outcome in &outcomes {
            if let TaskOutcome::Succeeded(descriptor) = outcome {
                succeeded += 1;
                total_bytes = total_bytes.saturating_add(descriptor.byte_size);
            }
        }
        let failed = outcomes.len() - succeeded;
        let average_bytes = if succeeded == 0 {
            0.0
        } else {
            total_bytes as f64 / succeeded as f64
        };
        Self {
            outcomes,
            succeeded,
            failed,
            total_bytes,
            average_bytes,
            stages,
            coverage,
            pool,
            css,
        }
    }

    pub fn total_tasks(&self) -> usize {
        self.outcomes.len()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ResultDescriptor> {
        self.outcomes.iter().filter_map(TaskOutcome::descriptor)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.outcomes.iter().filter_map(TaskOutcome::failure)
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.stage == stage)
    }

    pub fn total_elapsed(&self) -> Duration {
        match (self.stages.first(), self.stages.last()) {
            (Some(first), Some(last)) => last.end.saturating_duration_since(first.start),
            _ => Duration::ZERO,
        }
    }
}
