use crate::error::FontSplitError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Other,
    Sc,
    Tc,
}

/// Processing order for categories. Subset numbering follows this order.
pub const CATEGORY_ORDER: [Category; 3] = [Category::Other, Category::Sc, Category::Tc];

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Other => "other",
            Category::Sc => "SC",
            Category::Tc => "TC",
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            Category::Other => "other",
            Category::Sc => "sc",
            Category::Tc => "tc",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharsetSelection {
    pub sc: bool,
    pub tc: bool,
    pub other: bool,
}

impl Default for CharsetSelection {
    fn default() -> Self {
        Self {
            sc: true,
            tc: false,
            other: true,
        }
    }
}

impl CharsetSelection {
    pub fn none() -> Self {
        Self {
            sc: false,
            tc: false,
            other: false,
        }
    }

    pub fn with(mut self, category: Category, enabled: bool) -> Self {
        match category {
            Category::Other => self.other = enabled,
            Category::Sc => self.sc = enabled,
            Category::Tc => self.tc = enabled,
        }
        self
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Other => self.other,
            Category::Sc => self.sc,
            Category::Tc => self.tc,
        }
    }

    pub fn any_enabled(&self) -> bool {
        CATEGORY_ORDER.iter().any(|c| self.is_enabled(*c))
    }
}

/// Sorted, deduplicated codepoints of one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodepointSet {
    codepoints: Vec<u32>,
}

impl CodepointSet {
    pub fn from_unsorted(mut codepoints: Vec<u32>) -> Self {
        codepoints.sort_unstable();
        codepoints.dedup();
        Self { codepoints }
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.codepoints
    }

    pub fn len(&self) -> usize {
        self.codepoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codepoints.is_empty()
    }

    pub(crate) fn retain(&self, mut keep: impl FnMut(u32) -> bool) -> (Self, Vec<u32>) {
        let mut kept = Vec::with_capacity(self.codepoints.len());
        let mut dropped = Vec::new();
        for &cp in &self.codepoints {
            if keep(cp) {
                kept.push(cp);
            } else {
                dropped.push(cp);
            }
        }
        (Self { codepoints: kept }, dropped)
    }
}

/// Codepoint sets for every category; disabled categories hold an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharsetPartition {
    sets: BTreeMap<Category, CodepointSet>,
}

impl CharsetPartition {
    pub fn from_sets(sets: impl IntoIterator<Item = (Category, CodepointSet)>) -> Self {
        Self {
            sets: sets.into_iter().collect(),
        }
    }

    pub fn get(&self, category: Category) -> &CodepointSet {
        static EMPTY: CodepointSet = CodepointSet {
            codepoints: Vec::new(),
        };
        self.sets.get(&category).unwrap_or(&EMPTY)
    }

    pub fn total_len(&self) -> usize {
        self.sets.values().map(CodepointSet::len).sum()
    }

    pub(crate) fn map_sets(
        &self,
        mut f: impl FnMut(Category, &CodepointSet) -> CodepointSet,
    ) -> Self {
        Self {
            sets: self
                .sets
                .iter()
                .map(|(category, set)| (*category, f(*category, set)))
                .collect(),
        }
    }
}

/// Source of codepoints per category.
pub trait CharacterDatabase: Send + Sync {
    fn codepoints(&self, category: Category) -> Result<Vec<u32>, FontSplitError>;
}

pub fn partition(
    selection: &CharsetSelection,
    database: &dyn CharacterDatabase,
) -> Result<CharsetPartition, FontSplitError> {
    if !selection.any_enabled() {
        return Err(FontSplitError::InvalidConfiguration(
            "every character category is disabled".to_string(),
        ));
    }
    let mut sets = BTreeMap::new();
    for category in CATEGORY_ORDER {
        let set = if selection.is_enabled(category) {
            CodepointSet::from_unsorted(database.codepoints(category)?)
        } else {
            CodepointSet::default()
        };
        log::debug!("category {} resolved to {} codepoints", category, set.len());
        sets.insert(category, set);
    }
    Ok(CharsetPartition { sets })
}

#[derive(Debug, Clone, Default)]
pub struct StaticCharsetDatabase {
    sets: BTreeMap<Category, Vec<u32>>,
}

impl StaticCharsetDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: Category, codepoints: impl IntoIterator<Item = u32>) -> Self {
        self.sets.insert(category, codepoints.into_iter().collect());
        self
    }

    pub fn with_chars(self, category: Category, text: &str) -> Self {
        self.with(category, text.chars().map(|ch| ch as u32))
    }
}

impl CharacterDatabase for StaticCharsetDatabase {
    fn codepoints(&self, category: Category) -> Result<Vec<u32>, FontSplitError> {
        self.sets.get(&category).cloned().ok_or_else(|| {
            FontSplitError::DataUnavailable(format!("no character data for category {category}"))
        })
    }
}

/// Reads `sc.json`, `tc.json` and `other.json` from a directory.
///
/// Each file holds either an array of integer codepoints or a single string
/// whose characters form the set.
#[derive(Debug, Clone)]
pub struct JsonCharsetDatabase {
    dir: PathBuf,
}

impl JsonCharsetDatabase {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, category: Category) -> PathBuf {
        self.dir.join(format!("{}.json", category.file_stem()))
    }
}

impl CharacterDatabase for JsonCharsetDatabase {
    fn codepoints(&self, category: Category) -> Result<Vec<u32>, FontSplitError> {
        let path = self.path_for(category);
        let text = fs::read_to_string(&path).map_err(|err| {
            FontSplitError::DataUnavailable(format!("{}: {}", path.display(), err))
        })?;
        parse_charset_json(&text, &path)
    }
}

fn parse_charset_json(text: &str, path: &Path) -> Result<Vec<u32>, FontSplitError> {
    let malformed = |detail: &str| {
        FontSplitError::DataUnavailable(format!("{}: {}", path.display(), detail))
    };
    let value: Value = serde_json::from_str(text).map_err(|err| malformed(&err.to_string()))?;
    match value {
        Value::String(chars) => Ok(chars.chars().map(|ch| ch as u32).collect()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let cp = item
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .filter(|v| char::from_u32(*v).is_some())
                    .ok_or_else(|| malformed(&format!("invalid codepoint {item}")))?;
                out.push(cp);
            }
            Ok(out)
        }
        _ => Err(malformed("expected an array of codepoints or a string")),
    }
}
