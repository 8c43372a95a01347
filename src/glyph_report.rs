use crate::charset::Category;
use std::collections::BTreeMap;

/// Codepoints dropped from the selection because the source font has no glyph for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    missing: BTreeMap<Category, Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingGlyph {
    pub codepoint: u32,
    pub ch: Option<char>,
    pub category: Category,
}

impl CoverageReport {
    pub fn record_missing(&mut self, category: Category, codepoints: Vec<u32>) {
        if codepoints.is_empty() {
            return;
        }
        self.missing.entry(category).or_default().extend(codepoints);
    }

    pub fn missing_count(&self, category: Category) -> usize {
        self.missing.get(&category).map_or(0, Vec::len)
    }

    pub fn total_missing(&self) -> usize {
        self.missing.values().map(Vec::len).sum()
    }

    pub fn missing(&self) -> Vec<MissingGlyph> {
        self.missing
            .iter()
            .flat_map(|(category, codepoints)| {
                codepoints.iter().map(|&codepoint| MissingGlyph {
                    codepoint,
                    ch: char::from_u32(codepoint),
                    category: *category,
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}
