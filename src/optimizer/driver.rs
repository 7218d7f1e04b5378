use super::{FilterMode, FilterSet, StatKind, Stats};
use crate::checker::{CheckStatus, CheckerError, Ctx, Tool};
use crate::core::{Assignment, Bitseq, Selection};
use crate::module::ModuleError;
use log::{debug, info};
use std::fmt;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};
use thiserror::Error;

//
// Public Interface
//

/// The optimization strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Strategy {
    /// Linear relaxation: clear ordering bits slot by slot.
    LR,
    /// Delta debugging over the set of one-bits.
    DDmin,
}

#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub strategy: Strategy,
    pub filter: FilterMode,
    /// EMA weight of the speculative-timeout adaptation.
    pub alpha: f64,
    /// Initial speculative timeout; zero disables speculation.
    pub tau: Duration,
    /// Map checker errors to invalid assignments instead of aborting.
    pub error_as_invalid: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::LR,
            filter: FilterMode::Rlx,
            alpha: 0.0,
            tau: Duration::ZERO,
            error_as_invalid: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("check cancelled")]
    Cancelled,

    #[error("unexpected checker error: run debug output with -d\n{0}")]
    Checker(String),

    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// The module interface expected by optimization drivers.
pub trait MutableModule: fmt::Display {
    fn mutate(&mut self, a: Assignment) -> Result<(), ModuleError>;
    fn assignment(&self, sel: Selection) -> Assignment;
}

/// One correct (or speculatively correct) assignment found during the
/// search.
#[derive(Clone, Debug)]
pub struct Solution {
    pub(crate) bs: Bitseq,
    pub(crate) status: CheckStatus,
    pub(crate) elapsed: Duration,
}

impl Solution {
    pub fn bitseq(&self) -> &Bitseq {
        &self.bs
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }
}

/// Coordinates one optimization: runs the strategy, prunes with the
/// filter, speculates over timeouts, and rechecks speculative winners.
pub struct Driver {
    pub(crate) cfg: DriverConfig,
    pub(crate) checker: Box<dyn Tool>,
    pub(crate) filter: FilterSet,
    pub(crate) stats: Stats,
}

impl Driver {
    pub fn new(cfg: DriverConfig, checker: Box<dyn Tool>) -> Self {
        Self {
            cfg,
            checker,
            filter: FilterSet::new(),
            stats: Stats::new(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Starts the optimizer for a module over a selection of operations.
    /// Returns the most relaxed verified assignment; with speculation
    /// disabled the result always checked OK.
    pub fn run<M: MutableModule>(
        &mut self,
        ctx: &Ctx,
        m: &mut M,
        at: Selection,
    ) -> Result<Solution, OptimizerError> {
        // tau == 0 disables speculation
        let mut tau = self.cfg.tau;
        let mut a = m.assignment(at);

        info!("== OPTIMIZATION ==============================");
        loop {
            info!("START   {} #1 = {}", a.bs, a.bs.ones());

            let mut sol = match self.cfg.strategy {
                Strategy::LR => self.lr(ctx, m, a.clone(), tau)?,
                Strategy::DDmin => self.ddmin2(ctx, m, a.clone(), 2, tau)?,
            };

            // the input assignment is assumed correct
            sol.push(Solution {
                bs: a.bs.clone(),
                status: CheckStatus::OK,
                elapsed: Duration::ZERO,
            });
            log_solutions(&sol);

            // without speculation, or without improvement, the most
            // relaxed solution is final
            if sol[0].bs == a.bs || tau.is_zero() {
                return Ok(sol[0].clone());
            }

            let (idx, elapsed) = self.recheck(ctx, m, &mut a, &sol)?;
            if let Some(idx) = idx {
                assert!(idx < sol.len(), "out of bound index in solutions");
                return Ok(sol[idx].clone());
            }

            tau = adjust_tau(tau, elapsed, self.cfg.alpha);
            info!("NEW TAU {:?}", tau);
        }
    }

    //
    // Private Implementation
    //

    // Re-verifies the most relaxed candidate without a timeout. `Some(i)`
    // selects the final solution; `None` restarts the search with the
    // most relaxed confirmed assignment.
    fn recheck<M: MutableModule>(
        &mut self,
        ctx: &Ctx,
        m: &mut M,
        a: &mut Assignment,
        sol: &[Solution],
    ) -> Result<(Option<usize>, Duration), OptimizerError> {
        let s = &sol[0];
        let ts = Instant::now();
        let mut status = s.status;
        info!("RECHECK {}", s.bs);

        if status == CheckStatus::Timeout {
            m.mutate(Assignment::new(s.bs.clone(), a.sel))?;
            status = match self.checker.check(ctx, &*m) {
                Ok(r) => r.status,
                Err(CheckerError::Cancelled) => return Err(OptimizerError::Cancelled),
                Err(e) => return Err(OptimizerError::Checker(e.to_string())),
            };
        }

        let elapsed = ts.elapsed();
        if status == CheckStatus::OK {
            info!("OK      {:?}", elapsed);
            self.stats = Stats::new();
            return Ok((Some(0), elapsed));
        }

        info!("FAIL    {:?}", elapsed);
        self.stats.add_time("failure", elapsed);
        self.filter.set(&s.bs);

        // restart from the most relaxed assignment known to be correct;
        // the input assignment at the end guarantees one exists
        let first_ok =
            pick_next(sol, CheckStatus::OK).expect("input assignment is part of the solutions");
        a.bs = sol[first_ok].bs.clone();

        // index 0 failed the recheck; only retry if a timed-out candidate
        // remains between it and the first confirmed solution
        if pick_next(&sol[1..first_ok], CheckStatus::Timeout).is_none() {
            return Ok((Some(first_ok), elapsed));
        }
        Ok((None, elapsed))
    }

    // Mutates the module to `bs` and checks it under the speculative
    // timeout, updating stats and filter according to the outcome.
    pub(crate) fn check_one<M: MutableModule>(
        &mut self,
        ctx: &Ctx,
        m: &mut M,
        bs: &Bitseq,
        sel: Selection,
        tau: Duration,
    ) -> Result<(CheckStatus, Duration), OptimizerError> {
        info!("CHECK   {}", bs);
        let ts = Instant::now();
        let cctx = if tau.is_zero() {
            ctx.child()
        } else {
            ctx.with_timeout(tau)
        };

        if let Err(e) = m.mutate(Assignment::new(bs.clone(), sel)) {
            let elapsed = ts.elapsed();
            debug!("Failed mutation: {}", e);
            info!("INVALID {:?}", elapsed);
            self.stats.inc(StatKind::Total);
            self.stats.inc(StatKind::Invalid);
            self.filter.set(bs);
            return Ok((CheckStatus::Invalid, elapsed));
        }

        let result = self.checker.check(&cctx, &*m);
        let elapsed = ts.elapsed();
        self.stats.inc(StatKind::Total);

        let status = match result {
            Ok(r) => r.status,
            Err(CheckerError::Cancelled) => return Err(OptimizerError::Cancelled),
            Err(e) => {
                if !self.cfg.error_as_invalid {
                    info!("ERROR");
                    return Err(OptimizerError::Checker(e.to_string()));
                }
                self.stats.inc(StatKind::Error);
                info!("ERROR -> INVALID");
                self.filter.set(bs);
                return Ok((CheckStatus::Invalid, elapsed));
            }
        };

        match status {
            CheckStatus::OK => {
                info!("OK      {:?}", elapsed);
                self.stats.inc(StatKind::Success);
                self.stats.add_time("success", elapsed);
            }
            CheckStatus::Timeout => {
                info!("TIMEOUT {:?}", elapsed);
                self.stats.inc(StatKind::Timeout);
                self.stats.add_time("timeout", elapsed);
            }
            CheckStatus::NotSafe => {
                info!("NOTSAFE {:?}", elapsed);
                self.stats.inc(StatKind::NotSafe);
                self.stats.add_time("failure", elapsed);
                self.filter.set(bs);
            }
            CheckStatus::NotLive => {
                info!("NOTLIVE {:?}", elapsed);
                self.stats.inc(StatKind::NotLive);
                self.stats.add_time("failure", elapsed);
                self.filter.set(bs);
            }
            CheckStatus::Invalid | CheckStatus::Rejected => {
                info!("INVALID {:?}", elapsed);
                self.stats.inc(StatKind::Invalid);
                self.filter.set(bs);
            }
            CheckStatus::Undefined => {
                return Err(OptimizerError::Checker(
                    "checker returned an undefined status".to_string(),
                ))
            }
        }
        Ok((status, elapsed))
    }
}

//
// Private Implementation
//

/// Speculative-timeout adaptation: an EMA of the observed recheck
/// durations, never below the previous value.
pub(crate) fn adjust_tau(tau: Duration, elapsed: Duration, alpha: f64) -> Duration {
    if alpha == 0.0 {
        return tau + elapsed;
    }
    if tau.is_zero() {
        return elapsed;
    }
    let ntau =
        Duration::from_secs_f64(alpha * tau.as_secs_f64() + (1.0 - alpha) * elapsed.as_secs_f64());
    if ntau > tau {
        ntau
    } else {
        tau
    }
}

// index of the first solution with the wanted status
fn pick_next(sol: &[Solution], status: CheckStatus) -> Option<usize> {
    sol.iter().position(|s| s.status == status)
}

fn log_solutions(sol: &[Solution]) {
    info!("Current solutions");
    for s in sol {
        info!("+ {} {}", s.bs, s.status);
    }
}

#[cfg(test)]
mod tests {
    use super::super::lr::tests::driver_with;
    use super::*;
    use crate::core::Selection;

    #[test]
    fn run_keeps_unimprovable_input() {
        let mut t = driver_with(&[
            ("0000", CheckStatus::NotSafe),
            ("0010", CheckStatus::NotSafe),
            ("0001", CheckStatus::NotSafe),
            ("1011", CheckStatus::NotSafe),
            ("0111", CheckStatus::NotSafe),
            ("0011", CheckStatus::NotSafe),
        ]);
        *t.module.bs.borrow_mut() = Bitseq::from_bin_str("0011").unwrap();
        let ctx = Ctx::new();
        let s = t.driver.run(&ctx, &mut t.module, Selection::Atomic).unwrap();
        assert_eq!(s.bitseq().to_bin_string(), "0011");
        assert_eq!(s.status(), CheckStatus::OK);
        // every invoked check is counted
        assert_eq!(
            t.driver.stats().count(StatKind::Total),
            *t.checks.borrow() as u64
        );
    }

    #[test]
    fn speculative_timeout_confirmed_by_recheck() {
        let mut t = driver_with(&[
            ("110000", CheckStatus::NotSafe),
            ("110010", CheckStatus::NotSafe),
            ("110001", CheckStatus::OK), // recheck without tau
            ("000001", CheckStatus::NotSafe),
            ("010001", CheckStatus::NotSafe),
            ("100001", CheckStatus::NotSafe),
        ]);
        t.driver.cfg.tau = Duration::from_secs(5);
        t.speculative
            .borrow_mut()
            .insert("110001".to_string(), CheckStatus::Timeout);
        *t.module.bs.borrow_mut() = Bitseq::from_bin_str("110011").unwrap();
        let ctx = Ctx::new();
        let s = t.driver.run(&ctx, &mut t.module, Selection::Atomic).unwrap();
        assert_eq!(s.bitseq().to_bin_string(), "110001");
    }

    #[test]
    fn speculative_timeout_refuted_falls_back_to_first_ok() {
        let mut t = driver_with(&[
            ("010000", CheckStatus::NotSafe),
            ("010010", CheckStatus::NotSafe),
            ("010001", CheckStatus::OK),
            ("000001", CheckStatus::NotSafe), // recheck without tau refutes
        ]);
        t.driver.cfg.tau = Duration::from_secs(5);
        t.speculative
            .borrow_mut()
            .insert("000001".to_string(), CheckStatus::Timeout);
        *t.module.bs.borrow_mut() = Bitseq::from_bin_str("010011").unwrap();
        let ctx = Ctx::new();
        let s = t.driver.run(&ctx, &mut t.module, Selection::Atomic).unwrap();
        assert_eq!(s.bitseq().to_bin_string(), "010001");
        assert_eq!(s.status(), CheckStatus::OK);
        // the refuted speculation is now a known failure
        assert!(t
            .driver
            .filter
            .contains(&Bitseq::from_bin_str("000001").unwrap(), FilterMode::Rlx));
    }

    #[test]
    fn adjust_tau_without_alpha_accumulates() {
        let tau = adjust_tau(Duration::from_secs(1), Duration::from_secs(2), 0.0);
        assert_eq!(tau, Duration::from_secs(3));
    }

    #[test]
    fn adjust_tau_from_zero_takes_elapsed() {
        let tau = adjust_tau(Duration::ZERO, Duration::from_secs(2), 0.5);
        assert_eq!(tau, Duration::from_secs(2));
    }

    #[test]
    fn adjust_tau_is_monotone() {
        // EMA below the current tau is clamped
        let tau = adjust_tau(Duration::from_secs(10), Duration::from_secs(1), 0.5);
        assert_eq!(tau, Duration::from_secs(10));
        // EMA above the current tau is adopted
        let tau = adjust_tau(Duration::from_secs(1), Duration::from_secs(3), 0.5);
        assert_eq!(tau, Duration::from_secs(2));
    }
}
