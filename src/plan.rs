use crate::charset::{CATEGORY_ORDER, Category, CharsetPartition};
use crate::error::FontSplitError;
use std::collections::BTreeMap;

/// Desired number of chunks per category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBudget {
    counts: BTreeMap<Category, usize>,
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self {
            counts: BTreeMap::from([(Category::Tc, 3), (Category::Sc, 6), (Category::Other, 1)]),
        }
    }
}

impl ChunkBudget {
    pub fn with(mut self, category: Category, chunks: usize) -> Self {
        self.counts.insert(category, chunks);
        self
    }

    pub fn get(&self, category: Category) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subset {
    pub index: usize,
    pub category: Category,
    pub codepoints: Vec<u32>,
}

impl Subset {
    pub fn len(&self) -> usize {
        self.codepoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codepoints.is_empty()
    }
}

/// Splits every category into balanced subsets, numbered in `CATEGORY_ORDER`.
pub fn plan_subsets(
    partition: &CharsetPartition,
    budget: &ChunkBudget,
) -> Result<Vec<Subset>, FontSplitError> {
    let mut subsets = Vec::new();
    for category in CATEGORY_ORDER {
        let set = partition.get(category);
        if set.is_empty() {
            continue;
        }
        let requested = budget.get(category);
        if requested == 0 {
            return Err(FontSplitError::InvalidBudget {
                category,
                requested,
            });
        }
        for codepoints in split_balanced(set.as_slice(), requested) {
            subsets.push(Subset {
                index: subsets.len(),
                category,
                codepoints,
            });
        }
    }
    Ok(subsets)
}

/// Contiguous split into `min(n, len)` chunks whose sizes differ by at most one.
/// The first `len % n` chunks carry the extra element.
pub fn split_balanced(codepoints: &[u32], n: usize) -> Vec<Vec<u32>> {
    if codepoints.is_empty() || n == 0 {
        return Vec::new();
    }
    let chunks = n.min(codepoints.len());
    let base = codepoints.len() / chunks;
    let extra = codepoints.len() % chunks;
    let mut out = Vec::with_capacity(chunks);
    let mut start = 0;
    for idx in 0..chunks {
        let size = base + usize::from(idx < extra);
        out.push(codepoints[start..start + size].to_vec());
        start += size;
    }
    out
}
