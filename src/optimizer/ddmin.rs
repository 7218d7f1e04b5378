use super::delta::subslices;
use super::driver::{Driver, MutableModule, OptimizerError, Solution};
use crate::checker::{CheckStatus, Ctx};
use crate::core::{Assignment, Bitseq};
use std::time::Duration;

impl Driver {
    /// Delta debugging over the one-bits of the assignment: try to verify
    /// small subsets (deltas) of the set bits, then their complements
    /// (nablas), recursing on the first candidate that verifies and
    /// doubling the partition granularity otherwise. Returns the accepted
    /// path, most relaxed first.
    pub(crate) fn ddmin2<M: MutableModule>(
        &mut self,
        ctx: &Ctx,
        m: &mut M,
        a: Assignment,
        n: usize,
        tau: Duration,
    ) -> Result<Vec<Solution>, OptimizerError> {
        let bs = &a.bs;
        let bits = bs.len();
        if bs.ones() < n {
            return Ok(Vec::new());
        }

        let idxs = subslices(&bs.indices(), n);

        let deltas: Vec<Bitseq> = idxs
            .iter()
            .map(|i| Bitseq::new(bits).set(i))
            .filter(|delta| !self.filter.contains(delta, self.cfg.filter))
            .collect();
        for sp in deltas {
            let (status, _) = self.check_one(ctx, m, &sp, a.sel, tau)?;
            if status == CheckStatus::OK || status == CheckStatus::Timeout {
                let mut sol =
                    self.ddmin2(ctx, m, Assignment::new(sp.clone(), a.sel), 2, tau)?;
                sol.push(Solution {
                    bs: sp,
                    status,
                    elapsed: Duration::ZERO,
                });
                return Ok(sol);
            }
            self.filter.set(&sp);
        }

        let nablas: Vec<Bitseq> = idxs
            .iter()
            .map(|i| bs.xor(&Bitseq::new(bits).set(i)))
            .filter(|nabla| !self.filter.contains(nabla, self.cfg.filter))
            .collect();
        for sp in nablas {
            let (status, _) = self.check_one(ctx, m, &sp, a.sel, tau)?;
            if status == CheckStatus::OK || status == CheckStatus::Timeout {
                let next = n.saturating_sub(1).max(2);
                let mut sol =
                    self.ddmin2(ctx, m, Assignment::new(sp.clone(), a.sel), next, tau)?;
                sol.push(Solution {
                    bs: sp,
                    status,
                    elapsed: Duration::ZERO,
                });
                return Ok(sol);
            }
            self.filter.set(&sp);
        }

        if n < bs.ones() {
            return self.ddmin2(ctx, m, a.clone(), (2 * n).min(bs.ones()), tau);
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::super::lr::tests::driver_with;
    use crate::checker::{CheckStatus, Ctx};
    use crate::core::{Assignment, Bitseq, Selection};
    use std::time::Duration;

    fn assignment(s: &str) -> Assignment {
        Assignment::new(Bitseq::from_bin_str(s).unwrap(), Selection::Atomic)
    }

    #[test]
    fn ddmin_finds_minimal_subset() {
        // everything below 1100 verifies, everything else fails
        let ok = |s: &str| {
            let bs = Bitseq::from_bin_str(s).unwrap();
            let top = Bitseq::from_bin_str("1100").unwrap();
            bs.subset_of(&top) || bs == top
        };
        let all: Vec<String> = (0..16).map(|v| format!("{:04b}", v)).collect();
        let oracle: Vec<(&str, CheckStatus)> = all
            .iter()
            .map(|s| {
                let status = if ok(s) {
                    CheckStatus::OK
                } else {
                    CheckStatus::NotSafe
                };
                (s.as_str(), status)
            })
            .collect();

        let mut t = driver_with(&oracle);
        let ctx = Ctx::new();
        let sol = t
            .driver
            .ddmin2(&ctx, &mut t.module, assignment("1111"), 2, Duration::ZERO)
            .unwrap();

        assert!(!sol.is_empty());
        // the verifying half 1100 is found and minimized down to a single
        // bit; partitioning never yields an empty delta
        assert_eq!(sol[0].bitseq().to_bin_string(), "0100");
        assert!(sol
            .iter()
            .any(|s| s.bitseq().to_bin_string() == "1100"));
        assert!(sol[0].bitseq().ones() < sol.last().unwrap().bitseq().ones());
    }

    #[test]
    fn ddmin_gives_up_when_nothing_verifies() {
        let all: Vec<String> = (0..16).map(|v| format!("{:04b}", v)).collect();
        let oracle: Vec<(&str, CheckStatus)> = all
            .iter()
            .map(|s| (s.as_str(), CheckStatus::NotSafe))
            .collect();
        let mut t = driver_with(&oracle);
        let ctx = Ctx::new();
        let sol = t
            .driver
            .ddmin2(&ctx, &mut t.module, assignment("1111"), 2, Duration::ZERO)
            .unwrap();
        assert!(sol.is_empty());
    }
}
