use super::{CheckResult, CheckStatus, CheckerError, Ctx, DumpableModule, MemoryModel, Tool};
use crate::tools::{self, CmdOutcome};
use log::debug;
use std::fs;
use std::io::Write;
use std::path::Path;

//
// Public Interface
//

/// Adapter for the Dartagnan bounded model checker, invoked once per check
/// through a JVM. Runs that hit the unrolling bound are retried with a
/// widened bound.
pub struct Dartagnan {
    mm: MemoryModel,
}

impl Dartagnan {
    pub fn new(mm: MemoryModel) -> Self {
        Self { mm }
    }

    /// Registers the adapter's environment variables.
    pub fn register_env() {
        tools::reg_env("DARTAGNAN_HOME", "/dat3m", "Dartagnan installation directory");
        tools::reg_env("DARTAGNAN_JAVA_CMD", "java", "JVM command running the Dartagnan jar");
        tools::reg_env(
            "DARTAGNAN_OPTIONS",
            "",
            "Options appended to the Dartagnan command line",
        );
        tools::reg_env(
            "DARTAGNAN_SET_OPTIONS",
            "",
            "Options replacing the Dartagnan command line",
        );
    }
}

// exit code contract of the wrapper script
const EXIT_BOUNDED: i32 = 1;
const EXIT_PROGRAM_SPEC: i32 = 10;
const EXIT_CAT_SPEC: i32 = 11;
const EXIT_TERMINATION: i32 = 12;
const EXIT_UNKNOWN: i32 = 30;

// side file in which the tool records the unrolling bound it used
const BOUND_CSV: &str = "bound.csv";

impl Tool for Dartagnan {
    fn check(&self, ctx: &Ctx, m: &dyn DumpableModule) -> Result<CheckResult, CheckerError> {
        let mut tmp = tools::touch("dartagnan-", ".ll")?;
        write!(tmp, "{}", m)?;
        tmp.flush()?;
        let input = tmp.path().to_string_lossy().to_string();

        let home = tools::lookup_env("DARTAGNAN_HOME")?;
        let java = tools::find_cmd("DARTAGNAN_JAVA_CMD")?;

        let mut opts = vec![
            "--property=program_spec,cat_spec,liveness".to_string(),
            "--modeling.threadCreateAlwaysSucceeds=true".to_string(),
            "--encoding.wmm.idl2sat=true".to_string(),
            format!("--target={}", self.mm.arch()),
            format!("{}/cat/{}", home, self.mm.cat_file()),
        ];
        let extra = tools::lookup_env("DARTAGNAN_OPTIONS")?;
        opts.extend(extra.split_whitespace().map(|s| s.to_string()));
        let replace = tools::lookup_env("DARTAGNAN_SET_OPTIONS")?;
        if !replace.is_empty() {
            opts = replace.split_whitespace().map(|s| s.to_string()).collect();
        }

        let mut bound: Option<u64> = None;
        loop {
            let mut args = java[1..].to_vec();
            args.extend([
                "-jar".to_string(),
                format!("{}/dartagnan/target/dartagnan.jar", home),
                input.clone(),
            ]);
            args.extend(opts.iter().cloned());
            if let Some(b) = bound {
                args.push(format!("--bound={}", b));
            }

            let outcome = tools::run_cmd(ctx, &java[0], &args)?;
            let recorded = take_bound(Path::new(BOUND_CSV));

            let (output, code) = match outcome {
                CmdOutcome::Cancelled => return Err(CheckerError::Cancelled),
                CmdOutcome::DeadlineExceeded => {
                    return Ok(CheckResult::with_status(CheckStatus::Timeout))
                }
                CmdOutcome::Completed { output, code } => (output, code),
            };
            debug!("dartagnan exit code {}", code);

            match code {
                EXIT_BOUNDED => {
                    // widen the bound past the recorded insufficient one
                    bound = Some(recorded.map_or_else(
                        || bound.map_or(2, |b| b * 2),
                        |b| b + 1,
                    ));
                    debug!("bound insufficient, retrying with --bound={}", bound.unwrap());
                    continue;
                }
                EXIT_PROGRAM_SPEC | EXIT_CAT_SPEC => {
                    return Ok(CheckResult {
                        status: CheckStatus::NotSafe,
                        output,
                        num_executions: 0,
                    })
                }
                EXIT_TERMINATION => {
                    return Ok(CheckResult {
                        status: CheckStatus::NotLive,
                        output,
                        num_executions: 0,
                    })
                }
                EXIT_UNKNOWN => {
                    return Ok(CheckResult {
                        status: CheckStatus::Rejected,
                        output,
                        num_executions: 0,
                    })
                }
                0 => {
                    if output.contains("Number of iterations: 1\n") {
                        let text = "Zero violating behaviors found.\n\
                            If your code uses __VERIFIER_assume(...), be sure you know what you are doing!";
                        return Ok(CheckResult {
                            status: CheckStatus::Rejected,
                            output: text.to_string(),
                            num_executions: 0,
                        });
                    }
                    return Ok(CheckResult {
                        status: CheckStatus::OK,
                        output,
                        num_executions: 0,
                    });
                }
                _ => return Err(CheckerError::Tool(output)),
            }
        }
    }

    fn version(&self) -> String {
        // the jar does not expose a version flag; report the install path
        tools::lookup_env("DARTAGNAN_HOME").unwrap_or_else(|_| "unknown".to_string())
    }
}

//
// Private Implementation
//

// reads and deletes the bound side file
fn take_bound(path: &Path) -> Option<u64> {
    let content = fs::read_to_string(path).ok()?;
    let _ = fs::remove_file(path);
    content
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .last()
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_file_is_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BOUND_CSV);
        fs::write(&path, "benchmark,bound\nttaslock,3\n").unwrap();
        assert_eq!(take_bound(&path), Some(3));
        assert!(!path.exists());
        assert_eq!(take_bound(&path), None);
    }
}
