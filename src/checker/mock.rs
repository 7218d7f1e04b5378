use super::{CheckResult, CheckerError, Ctx, DumpableModule, Tool};

//
// Public Interface
//

/// A checker returning a preset result, for tests.
#[derive(Default)]
pub struct Mock {
    pub result: CheckResult,
    pub fail: Option<String>,
}

impl Mock {
    pub fn new(result: CheckResult) -> Self {
        Self { result, fail: None }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            result: CheckResult::default(),
            fail: Some(msg.to_string()),
        }
    }
}

impl Tool for Mock {
    fn check(&self, _ctx: &Ctx, _m: &dyn DumpableModule) -> Result<CheckResult, CheckerError> {
        match &self.fail {
            Some(msg) => Err(CheckerError::Internal(msg.clone())),
            None => Ok(self.result.clone()),
        }
    }

    fn version(&self) -> String {
        "v0.0.0".to_string()
    }
}
