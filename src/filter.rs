use std::collections::HashSet;
use std::iter::FromIterator;

/// IdFilter
///
/// A block-list of arbitration IDs. Frames whose ID is a member are
/// suppressed before they reach the inbound queue. Duplicates in the source
/// list collapse into a single entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdFilter {
    blocked: HashSet<u32>,
}

impl IdFilter {
    /// A filter that lets everything through.
    pub fn allow_all() -> IdFilter {
        IdFilter::default()
    }

    /// Construct a filter from a list of IDs to block.
    pub fn new<I: IntoIterator<Item = u32>>(ids: I) -> IdFilter {
        IdFilter {
            blocked: ids.into_iter().collect(),
        }
    }

    /// `true` iff `id` is on the block-list.
    #[inline]
    pub fn should_drop(&self, id: u32) -> bool {
        self.blocked.contains(&id)
    }

    /// Number of distinct blocked IDs.
    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

impl FromIterator<u32> for IdFilter {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> IdFilter {
        IdFilter::new(iter)
    }
}

impl From<Vec<u32>> for IdFilter {
    fn from(ids: Vec<u32>) -> IdFilter {
        IdFilter::new(ids)
    }
}
