use crate::core::Bitseq;
use std::collections::HashSet;
use strum::{Display, EnumString};

//
// Public Interface
//

/// How aggressively known-failing assignments prune the search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FilterMode {
    /// No pruning.
    None,
    /// Prune exact duplicates.
    Dup,
    /// Prune everything at most as constrained as a known failure. Fewer
    /// one-bits means less synchronization, so a subset of a failing
    /// assignment fails as well.
    Rlx,
}

/// The set of bit sequences that failed verification, keyed by canonical
/// binary string.
#[derive(Debug, Default)]
pub struct FilterSet(HashSet<String>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers a failing assignment.
    pub fn set(&mut self, bs: &Bitseq) {
        self.0.insert(bs.to_bin_string());
    }

    /// Whether the set prunes `bs` under the given mode.
    pub fn contains(&self, bs: &Bitseq, mode: FilterMode) -> bool {
        match mode {
            FilterMode::None => false,
            FilterMode::Dup => self.0.contains(&bs.to_bin_string()),
            FilterMode::Rlx => self.0.iter().any(|stored| {
                let o = Bitseq::from_bin_str(stored)
                    .expect("filter entries are valid binary strings");
                bs.subset_of(&o) || *bs == o
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bs(s: &str) -> Bitseq {
        s.parse().unwrap()
    }

    #[test]
    fn set_remembers_by_binary_string() {
        let mut f = FilterSet::new();
        f.set(&bs("0x0").fit(2));
        assert!(f.contains(&bs("0x0").fit(2), FilterMode::Dup));
        assert!(!f.contains(&bs("0x3").fit(2), FilterMode::Dup));
    }

    #[test]
    fn none_never_contains() {
        let mut f = FilterSet::new();
        f.set(&bs("0x1"));
        assert!(!f.contains(&bs("0x1"), FilterMode::None));
    }

    #[test]
    fn dup_is_exact_membership() {
        let mut f = FilterSet::new();
        let yes = bs("0x1").fit(4);
        f.set(&yes);
        assert!(f.contains(&yes, FilterMode::Dup));
        assert!(!f.contains(&bs("0x0").fit(4), FilterMode::Dup));
        assert!(!f.contains(&bs("0x3").fit(4), FilterMode::Dup));
    }

    #[test]
    fn rlx_prunes_subsets() {
        let mut f = FilterSet::new();
        let yes = bs("0x1").fit(4);
        f.set(&yes);
        assert!(f.contains(&yes, FilterMode::Rlx));
        // 0x0 is a strict subset of the stored failure
        assert!(f.contains(&bs("0x0").fit(4), FilterMode::Rlx));
        // 0x3 is strictly more constrained
        assert!(!f.contains(&bs("0x3").fit(4), FilterMode::Rlx));
    }
}
