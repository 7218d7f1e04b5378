use super::{
    combine_results, CheckResult, CheckStatus, CheckerError, Ctx, DumpableModule, MemoryModel,
    Tool,
};
use crate::tools::{self, CmdOutcome};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use std::io::Write;
use std::thread;

//
// Public Interface
//

/// Adapter for the GenMC stateless model checker. One check may fan out to
/// several racing worker invocations with randomly seeded schedulers; the
/// first decisive worker wins and cancels the rest.
pub struct GenMc {
    mm: MemoryModel,
    threads: usize,
    cmd_path: Option<String>,
}

impl GenMc {
    pub fn new(mm: MemoryModel, threads: usize, cmd_path: Option<String>) -> Self {
        Self {
            mm,
            threads: threads.max(1),
            cmd_path,
        }
    }

    /// Registers the adapter's environment variables.
    pub fn register_env() {
        tools::reg_env("GENMC_CMD", "genmc", "GenMC command");
        tools::reg_env("GENMC_OPTIONS", "", "Options appended to the GenMC command line");
        tools::reg_env(
            "GENMC_SET_OPTIONS",
            "",
            "Options replacing the GenMC command line",
        );
    }
}

// all verification errors exit with this code; anything else nonzero is an
// internal failure
const GENMC_ERROR_CODE: i32 = 42;

impl Tool for GenMc {
    fn check(&self, ctx: &Ctx, m: &dyn DumpableModule) -> Result<CheckResult, CheckerError> {
        let mut tmp = tools::touch("input-", ".ll")?;
        write!(tmp, "{}", m)?;
        tmp.flush()?;
        let input = tmp.path().to_string_lossy().to_string();
        debug!("checking {}", input);

        let cmd = self.command()?;
        let version = detect_version(ctx, &cmd[0]);
        let opts = self.opts(version)?;

        let mut opt_groups = vec![[opts.clone(), vec![input.clone()]].concat()];
        for i in 1..self.threads {
            opt_groups.push(
                [
                    opts.clone(),
                    vec![
                        format!("-random-schedule-seed={}", i),
                        "-schedule-policy=random".to_string(),
                        input.clone(),
                    ],
                ]
                .concat(),
            );
        }

        let group = ctx.child();
        let worker_results = thread::scope(|s| {
            let handles: Vec<_> = opt_groups
                .iter()
                .map(|opts| {
                    let group = group.clone();
                    let cmd = &cmd;
                    s.spawn(move || {
                        let r = check_one(&group, cmd, opts);
                        // first finisher wins; losers are cancelled
                        group.cancel();
                        r
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker does not panic"))
                .collect::<Vec<_>>()
        });

        if ctx.is_cancelled() {
            return Err(CheckerError::Cancelled);
        }

        let mut results = Vec::new();
        for r in worker_results {
            match r? {
                Some(result) => results.push(result),
                None => {}
            }
        }
        combine_results(&results)
    }

    fn version(&self) -> String {
        let cmd = match self.command() {
            Ok(cmd) => cmd,
            Err(_) => return "unknown".to_string(),
        };
        match tools::run_cmd(&Ctx::new(), &cmd[0], &["--version".to_string()]) {
            Ok(CmdOutcome::Completed { output, .. }) => output.trim().to_string(),
            _ => "unknown".to_string(),
        }
    }
}

//
// Private Implementation
//

lazy_static! {
    static ref RE_VERSION: Regex = Regex::new(r"v(\d+)\.(\d+)(\.(\d+))?").unwrap();
    static ref RE_EXECUTIONS: Regex =
        Regex::new(r"Number of complete executions explored: (\d+)").unwrap();
}

impl GenMc {
    fn command(&self) -> Result<Vec<String>, CheckerError> {
        match &self.cmd_path {
            Some(path) => Ok(vec![format!("{}/genmc", path)]),
            None => Ok(tools::find_cmd("GENMC_CMD")?),
        }
    }

    fn opts(&self, version: (u64, u64)) -> Result<Vec<String>, CheckerError> {
        let mut opts: Vec<String> = if version.0 == 0 && version.1 < 10 {
            // options for v0.8.x and v0.9.x
            [
                "-mo",
                "-check-liveness",
                "-disable-confirmation-annotation",
                "-disable-spin-assume",
                "-disable-load-annotation",
                "-disable-cast-elimination",
                "-disable-code-condenser",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect()
        } else {
            [
                "-check-liveness",
                "-disable-ipr",
                "-disable-sr",
                "-disable-estimation",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect()
        };

        match self.mm {
            MemoryModel::IMM => opts.push("-imm".to_string()),
            MemoryModel::RC11 => opts.push("-rc11".to_string()),
            mm => {
                return Err(CheckerError::Internal(format!(
                    "genmc does not support '{}'",
                    mm
                )))
            }
        }

        let extra = tools::lookup_env("GENMC_OPTIONS")?;
        opts.extend(extra.split_whitespace().map(|s| s.to_string()));

        let replace = tools::lookup_env("GENMC_SET_OPTIONS")?;
        if !replace.is_empty() {
            opts = replace.split_whitespace().map(|s| s.to_string()).collect();
        }
        Ok(opts)
    }
}

fn detect_version(ctx: &Ctx, cmd: &str) -> (u64, u64) {
    if let Ok(CmdOutcome::Completed { output, .. }) =
        tools::run_cmd(ctx, cmd, &["--version".to_string()])
    {
        if let Some(caps) = RE_VERSION.captures(&output) {
            let major = caps[1].parse().unwrap_or(0);
            let minor = caps[2].parse().unwrap_or(0);
            debug!("Detected GenMC version v{}.{}", major, minor);
            return (major, minor);
        }
    }
    debug!("could not detect GenMC version, assuming a recent one");
    (0, 10)
}

// one worker invocation; None means the worker was cancelled
fn check_one(
    ctx: &Ctx,
    cmd: &[String],
    opts: &[String],
) -> Result<Option<CheckResult>, CheckerError> {
    let args = [cmd[1..].to_vec(), opts.to_vec()].concat();
    let outcome = tools::run_cmd(ctx, &cmd[0], &args)?;

    let (output, code) = match outcome {
        CmdOutcome::Cancelled => return Ok(None),
        CmdOutcome::DeadlineExceeded => {
            return Ok(Some(CheckResult::with_status(CheckStatus::Timeout)))
        }
        CmdOutcome::Completed { output, code } => (output, code),
    };
    let filtered = filter_output(&output);

    if code != 0 {
        if code != GENMC_ERROR_CODE {
            debug!("Internal genmc error (exit code {})", code);
            return Err(CheckerError::Tool(output));
        }
        let status = if terminates(&output) {
            CheckStatus::NotSafe
        } else {
            CheckStatus::NotLive
        };
        return Ok(Some(CheckResult {
            status,
            output: filtered,
            num_executions: 0,
        }));
    }

    if !terminates(&output) {
        return Err(CheckerError::Internal(
            "liveness violation without error status".to_string(),
        ));
    }

    let executions = RE_EXECUTIONS
        .captures(&filtered)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    if executions == 0 {
        let text = "\nZero executions explored.\n\
                    If your code uses __VERIFIER_assume(...), be sure you know what you are doing!";
        return Ok(Some(CheckResult {
            status: CheckStatus::Rejected,
            output: text.to_string(),
            num_executions: 0,
        }));
    }
    info!("genmc explored {} executions", executions);
    Ok(Some(CheckResult {
        status: CheckStatus::OK,
        output: filtered,
        num_executions: executions,
    }))
}

fn terminates(output: &str) -> bool {
    !output.contains("Liveness violation!")
}

// drop the bug-report preamble and warning lines from the tool output
fn filter_output(output: &str) -> String {
    if let Some(idx) = output.find("Please submit") {
        let mut lines = output[idx..].lines();
        lines.next();
        return lines.collect::<Vec<_>>().join("\n");
    }
    output
        .lines()
        .filter(|l| !l.contains("warning:"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_marker_classification() {
        assert!(!terminates("...\nLiveness violation!\n..."));
        assert!(terminates("No errors were detected."));
    }

    #[test]
    fn execution_count_extraction() {
        let out = "Number of complete executions explored: 17\n";
        let caps = RE_EXECUTIONS.captures(out).unwrap();
        assert_eq!(&caps[1], "17");
    }

    #[test]
    fn output_filter_drops_warnings() {
        let out = "warning: something\nresult line\n";
        assert_eq!(filter_output(out), "result line");
    }

    #[test]
    fn version_regex() {
        let caps = RE_VERSION.captures("GenMC (genmc) v0.10.1").unwrap();
        assert_eq!(&caps[1], "0");
        assert_eq!(&caps[2], "10");
    }
}
