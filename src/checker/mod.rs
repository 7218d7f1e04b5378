//! Checkers decide whether a module is correct, unsafe, or hangs under a
//! weak memory model. Each backend lives in its own module and implements
//! the [`Tool`] capability.

pub mod dartagnan;
pub mod genmc;
pub mod memory_model;
pub mod mock;

pub use dartagnan::Dartagnan;
pub use genmc::GenMc;
pub use memory_model::MemoryModel;
pub use mock::Mock;

pub use crate::tools::Ctx;

use std::fmt;
use strum::{Display, EnumString};
use thiserror::Error;

//
// Public Interface
//

/// The module interface required by checkers: text emission only.
pub trait DumpableModule: fmt::Display {}

impl<T: fmt::Display> DumpableModule for T {}

/// A pluggable verification capability.
pub trait Tool {
    fn check(&self, ctx: &Ctx, m: &dyn DumpableModule) -> Result<CheckResult, CheckerError>;
    fn version(&self) -> String;
}

/// Outcome classification of a check run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum CheckStatus {
    Undefined,
    OK,
    NotSafe,
    NotLive,
    Invalid,
    Timeout,
    Rejected,
}

/// Result of a check run: the status, the tool output, and for exploration
/// tools the number of complete executions explored.
#[derive(Clone, Debug, Default)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub output: String,
    pub num_executions: u64,
}

impl Default for CheckStatus {
    fn default() -> Self {
        CheckStatus::Undefined
    }
}

impl CheckResult {
    pub fn with_status(status: CheckStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("check cancelled")]
    Cancelled,

    #[error("checker reported an internal failure:\n{0}")]
    Tool(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Tools(#[from] crate::tools::ToolsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Combines the results of racing workers by priority: any violation or
/// rejection wins, then any success, then any timeout.
pub(crate) fn combine_results(results: &[CheckResult]) -> Result<CheckResult, CheckerError> {
    for r in results {
        if matches!(
            r.status,
            CheckStatus::NotLive | CheckStatus::NotSafe | CheckStatus::Rejected
        ) {
            return Ok(r.clone());
        }
    }
    for r in results {
        if r.status == CheckStatus::OK {
            return Ok(r.clone());
        }
    }
    for r in results {
        if r.status == CheckStatus::Timeout {
            return Ok(r.clone());
        }
    }
    Err(CheckerError::Internal(
        "no worker produced a result".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_prefers_violations() {
        let results = vec![
            CheckResult::with_status(CheckStatus::OK),
            CheckResult::with_status(CheckStatus::Timeout),
            CheckResult::with_status(CheckStatus::NotLive),
        ];
        assert_eq!(
            combine_results(&results).unwrap().status,
            CheckStatus::NotLive
        );
    }

    #[test]
    fn combine_prefers_ok_over_timeout() {
        let results = vec![
            CheckResult::with_status(CheckStatus::Timeout),
            CheckResult::with_status(CheckStatus::OK),
        ];
        assert_eq!(combine_results(&results).unwrap().status, CheckStatus::OK);
    }

    #[test]
    fn combine_with_no_decisive_result_fails() {
        let results = vec![CheckResult::with_status(CheckStatus::Undefined)];
        assert!(combine_results(&results).is_err());
    }
}
