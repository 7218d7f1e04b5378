//! Process-level helpers: cancellation contexts, the environment-variable
//! registry, subprocess execution, and file plumbing.

pub mod ctx;
pub mod env;

pub use ctx::Ctx;
pub use env::{get_env, is_default_env, lookup_env, reg_env, Envvar};

use log::{debug, warn};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;

//
// Public Interface
//

#[derive(Debug, Error)]
pub enum ToolsError {
    #[error("could not run '{cmd}': {source}")]
    Spawn {
        cmd: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("environment variable '{0}' not registered")]
    UnknownEnvvar(String),
}

/// Outcome of a subprocess run under a cancellation context.
#[derive(Debug)]
pub enum CmdOutcome {
    Completed { output: String, code: i32 },
    Cancelled,
    DeadlineExceeded,
}

/// Runs a command to completion, killing it when the context is cancelled
/// or its deadline passes. Standard output and standard error are drained
/// concurrently and returned combined.
pub fn run_cmd(ctx: &Ctx, cmd: &str, args: &[String]) -> Result<CmdOutcome, ToolsError> {
    debug!("{} {}", cmd, args.join(" "));

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolsError::Spawn {
            cmd: cmd.to_string(),
            source,
        })?;

    let mut stdout = child.stdout.take().expect("stdout is piped");
    let mut stderr = child.stderr.take().expect("stderr is piped");

    thread::scope(|s| {
        let out = s.spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        });
        let err = s.spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        });

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if ctx.is_cancelled() || ctx.deadline_exceeded() {
                if let Err(e) = child.kill() {
                    warn!("could not kill subprocess: {}", e);
                }
                child.wait()?;
                break None;
            }
            thread::sleep(Duration::from_millis(20));
        };

        let mut output = out.join().unwrap_or_default();
        output.push_str(&err.join().unwrap_or_default());

        Ok(match status {
            None if ctx.is_cancelled() => CmdOutcome::Cancelled,
            None => CmdOutcome::DeadlineExceeded,
            Some(status) => CmdOutcome::Completed {
                output,
                code: status.code().unwrap_or(-1),
            },
        })
    })
}

/// Resolves a command line from a registered environment variable; the
/// value may carry leading arguments (e.g. `java -Xmx4g`).
pub fn find_cmd(key: &str) -> Result<Vec<String>, ToolsError> {
    let val = lookup_env(key)?;
    Ok(val.split_whitespace().map(|s| s.to_string()).collect())
}

/// Creates a fresh temporary file in the working directory; the file is
/// removed when the handle drops.
pub fn touch(prefix: &str, suffix: &str) -> Result<NamedTempFile, ToolsError> {
    let tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(".")?;
    Ok(tmp)
}

/// Writes the current state of a module to a file.
pub fn dump(m: &dyn fmt::Display, path: &Path) -> Result<(), ToolsError> {
    debug!("Dump file '{}'", path.display());
    fs::write(path, m.to_string())?;
    Ok(())
}

/// Deletes a file.
pub fn remove(path: &Path) -> Result<(), ToolsError> {
    debug!("Remove file '{}'", path.display());
    fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn run_cmd_captures_output_and_code() {
        let ctx = Ctx::new();
        match run_cmd(&ctx, "sh", &["-c".into(), "echo hi; exit 3".into()]).unwrap() {
            CmdOutcome::Completed { output, code } => {
                assert_eq!(output.trim(), "hi");
                assert_eq!(code, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn run_cmd_honors_deadline() {
        let ctx = Ctx::new().with_timeout(Duration::from_millis(80));
        let start = Instant::now();
        match run_cmd(&ctx, "sleep", &["5".into()]).unwrap() {
            CmdOutcome::DeadlineExceeded => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn run_cmd_honors_cancellation() {
        let ctx = Ctx::new();
        ctx.cancel();
        match run_cmd(&ctx, "sleep", &["5".into()]).unwrap() {
            CmdOutcome::Cancelled => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn run_cmd_unknown_command() {
        let ctx = Ctx::new();
        assert!(run_cmd(&ctx, "no-such-command-here", &[]).is_err());
    }
}
