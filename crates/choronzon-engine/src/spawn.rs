//! Target spawn contract: create the coverage FIFO, write the serialized
//! candidate to a stable input path, launch the target with that path,
//! and read the coverage wire protocol off the FIFO while the target
//! runs. A per-trial timeout signals the tracer (`SIGUSR2`, POSIX-only)
//! and force-kills the target after a grace period if it hasn't flushed a
//! sentinel by then.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use choronzon_core::{ChoronzonError, ErrorInfo};
use choronzon_coverage::{CoverageSet, TerminationReason};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::config::TargetConfig;

/// Placeholder token in [`TargetConfig::args`] replaced with the trial's
/// input file path.
const INPUT_PLACEHOLDER: &str = "@@";

/// Executes one trial against a target under the tracer and returns the
/// coverage it produced. Implemented by [`ProcessExecutor`] for real
/// campaigns and by in-memory stubs in tests, so determinism can be
/// checked without a real tracer process.
pub trait TrialExecutor {
    /// Runs the target against `serialized`, honoring `timeout`.
    fn execute(
        &mut self,
        serialized: &[u8],
        timeout: Duration,
        grace: Duration,
    ) -> Result<(CoverageSet, TerminationReason), ChoronzonError>;
}

/// Spawns a real target process per trial over a FIFO the engine creates
/// before the target is allowed to run.
pub struct ProcessExecutor {
    target: TargetConfig,
    input_path: PathBuf,
    fifo_path: PathBuf,
}

impl ProcessExecutor {
    /// Creates an executor that reuses `scratch_dir/input.bin` and
    /// `scratch_dir/coverage.fifo` across trials (both are recreated fresh
    /// on each call).
    pub fn new(target: TargetConfig, scratch_dir: &Path) -> Self {
        Self {
            target,
            input_path: scratch_dir.join("input.bin"),
            fifo_path: scratch_dir.join("coverage.fifo"),
        }
    }
}

impl TrialExecutor for ProcessExecutor {
    fn execute(
        &mut self,
        serialized: &[u8],
        timeout: Duration,
        grace: Duration,
    ) -> Result<(CoverageSet, TerminationReason), ChoronzonError> {
        recreate_fifo(&self.fifo_path)?;
        std::fs::write(&self.input_path, serialized)
            .map_err(|err| ChoronzonError::io("trial-write-input", self.input_path.display().to_string(), err))?;

        let mut child = spawn_target(&self.target, &self.input_path, &self.fifo_path)?;
        let pid = Pid::from_raw(child.id() as i32);

        let fifo_path = self.fifo_path.clone();
        let timeout_signaled = Arc::new(AtomicBool::new(false));
        let reader_signaled = Arc::clone(&timeout_signaled);
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = std::fs::File::open(&fifo_path)
                .map_err(|err| ChoronzonError::io("trial-open-fifo", fifo_path.display().to_string(), err))
                .and_then(|mut file| {
                    read_trial_stream(&mut file, move || reader_signaled.load(Ordering::SeqCst))
                });
            let _ = tx.send(result);
        });

        let outcome = match rx.recv_timeout(timeout) {
            Ok(result) => {
                reap(&mut child);
                result
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                timeout_signaled.store(true, Ordering::SeqCst);
                let _ = signal::kill(pid, Signal::SIGUSR2);
                match rx.recv_timeout(grace) {
                    Ok(result) => {
                        reap(&mut child);
                        result
                    }
                    Err(_) => {
                        let _ = child.kill();
                        reap(&mut child);
                        // The reader thread unblocks once the target's FIFO
                        // write end closes; block (no further timeout) for
                        // its final classification.
                        rx.recv().unwrap_or_else(|_| {
                            Err(ChoronzonError::Tracer(ErrorInfo::new(
                                "tracer-thread-lost",
                                "coverage reader thread terminated without a result",
                            )))
                        })
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                reap(&mut child);
                Err(ChoronzonError::Tracer(ErrorInfo::new(
                    "tracer-thread-lost",
                    "coverage reader thread terminated without a result",
                )))
            }
        };
        outcome
    }
}

fn read_trial_stream<R: Read>(
    reader: &mut R,
    timeout_already_signaled: impl Fn() -> bool,
) -> Result<(CoverageSet, TerminationReason), ChoronzonError> {
    let (_table, coverage, reason) = choronzon_coverage::ingest(reader, timeout_already_signaled)?;
    Ok((coverage, reason))
}

fn recreate_fifo(path: &Path) -> Result<(), ChoronzonError> {
    if path.exists() {
        std::fs::remove_file(path)
            .map_err(|err| ChoronzonError::io("trial-fifo-remove", path.display().to_string(), err))?;
    }
    nix::unistd::mkfifo(path, nix::sys::stat::Mode::from_bits_truncate(0o600)).map_err(|err| {
        ChoronzonError::TargetSpawn(
            ErrorInfo::new("trial-fifo-create", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })
}

fn spawn_target(target: &TargetConfig, input_path: &Path, fifo_path: &Path) -> Result<Child, ChoronzonError> {
    let args: Vec<String> = target
        .args
        .iter()
        .map(|arg| {
            if arg == INPUT_PLACEHOLDER {
                input_path.display().to_string()
            } else {
                arg.clone()
            }
        })
        .collect();
    Command::new(&target.command)
        .args(&args)
        .env(&target.fifo_env_var, fifo_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| {
            ChoronzonError::TargetSpawn(
                ErrorInfo::new("target-spawn", err.to_string())
                    .with_context("command", target.command.clone()),
            )
        })
}

fn reap(child: &mut Child) {
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_placeholder_is_the_afl_style_token() {
        assert_eq!(INPUT_PLACEHOLDER, "@@");
    }
}
