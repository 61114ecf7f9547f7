//! Spawn-all / wait-all execution of external pipelines.
//!
//! Every stage is started before any of them is waited on, otherwise a
//! writer could fill its pipe and block on a reader that was never started.
//! Adjacent stages are joined by one OS pipe: the earlier stage's stdout is
//! created piped and its read end is moved into the next stage's stdin, so
//! after spawning the interpreter holds no copy of any inter-stage endpoint
//! and end-of-stream reaches every reader.

use crate::command::{ExitCode, Pipeline};
use crate::config::{Config, OutputMode, SpawnFailurePolicy};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::{Launcher, ProcessHandle};
use log::{debug, warn};
use std::io::{self, Write};
use std::process::{ChildStdout, Stdio};

/// Exit status of one waited stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitObservation {
    pub stage_index: usize,
    pub program: String,
    pub pid: u32,
    pub code: ExitCode,
}

/// Result of running a line: what every started stage did, and what failed.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub observations: Vec<ExitObservation>,
    /// Per-stage failures ordered by stage index.
    pub errors: Vec<ShellError>,
}

impl PipelineOutcome {
    /// True when every stage started and exited with status 0.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Exit code of the whole line, taken from the last failing stage.
    pub fn exit_code(&self) -> ExitCode {
        self.errors.last().map_or(0, ShellError::exit_code)
    }
}

/// Run every stage of `pipeline` as an external process.
///
/// The first stage reads the interpreter's stdin. The last stage writes to
/// the interpreter's stdout, or into `out` when `config.output` is
/// [`OutputMode::Capture`]. Starting stops at the first stage that cannot be
/// started; stages started before it are waited for (or killed first, under
/// [`SpawnFailurePolicy::TerminateStarted`]). No failure aborts the wait of
/// the other stages.
pub fn run_external(
    pipeline: &Pipeline,
    env: &Environment,
    launcher: &dyn Launcher,
    config: &Config,
    out: &mut dyn Write,
) -> PipelineOutcome {
    let stages = pipeline.stages();
    let last = stages.len() - 1;
    let mut outcome = PipelineOutcome::default();
    let mut handles: Vec<ProcessHandle> = Vec::with_capacity(stages.len());
    // read end of the pipe feeding the next stage
    let mut upstream: Option<ChildStdout> = None;

    for (index, stage) in stages.iter().enumerate() {
        let stdin = match upstream.take() {
            Some(reader) => Stdio::from(reader),
            None if index == 0 => Stdio::inherit(),
            None => Stdio::null(),
        };
        let stdout = if index < last || config.output == OutputMode::Capture {
            Stdio::piped()
        } else {
            Stdio::inherit()
        };

        match ProcessHandle::spawn(launcher, env, index, stage, stdin, stdout) {
            Ok(mut handle) => {
                if index < last {
                    upstream = handle.take_stdout();
                }
                handles.push(handle);
            }
            Err(err) => {
                // the read end meant for this stage went down with its command,
                // so the upstream writer gets a broken pipe instead of blocking
                warn!("{err}");
                outcome.errors.push(err);
                break;
            }
        }
    }
    drop(upstream);

    if !outcome.errors.is_empty() && config.spawn_failure == SpawnFailurePolicy::TerminateStarted {
        for handle in &mut handles {
            debug!("stage {}: killing pid {}", handle.stage_index(), handle.id());
            if let Err(e) = handle.kill() {
                warn!("stage {}: cannot kill pid {}: {e}", handle.stage_index(), handle.id());
            }
        }
    }

    // the last stage loses its reader when the copy fails; its exit is not reported again
    let mut copy_failed = false;
    if config.output == OutputMode::Capture {
        if let Some(handle) = handles.last_mut().filter(|h| h.stage_index() == last) {
            if let Some(mut reader) = handle.take_stdout() {
                if let Err(cause) = io::copy(&mut reader, out) {
                    warn!("stage {last}: cannot forward output: {cause}");
                    outcome.errors.push(ShellError::WriteFailed {
                        command: "pipeshell",
                        cause,
                    });
                    copy_failed = true;
                }
            }
        }
    }

    for handle in handles {
        let stage_index = handle.stage_index();
        let program = handle.program().to_string();
        let pid = handle.id();
        match handle.wait() {
            Ok(code) => {
                debug!("stage {stage_index}: `{program}` (pid {pid}) exited with {code}");
                if code != 0 && !(copy_failed && stage_index == last) {
                    outcome.errors.push(ShellError::StageExited {
                        stage_index,
                        program: program.clone(),
                        code,
                    });
                }
                outcome.observations.push(ExitObservation {
                    stage_index,
                    program,
                    pid,
                    code,
                });
            }
            Err(err) => {
                warn!("{err}");
                outcome.errors.push(err);
            }
        }
    }

    outcome.errors.sort_by_key(ShellError::stage_index);
    outcome
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::external::SystemLauncher;
    use crate::lexer::{PIPE, split_pipeline};
    use std::process::{Child, Command};

    fn run(line: &str, config: &Config) -> (PipelineOutcome, String) {
        let env = Environment::capture().unwrap();
        let pipeline = split_pipeline(line, PIPE).unwrap();
        let mut out: Vec<u8> = Vec::new();
        let outcome = run_external(&pipeline, &env, &SystemLauncher, config, &mut out);
        (outcome, String::from_utf8(out).unwrap())
    }

    /// Fails the spawn of one stage, starts the others normally.
    struct FailAt(usize);

    impl Launcher for FailAt {
        fn launch(&self, stage_index: usize, command: &mut Command) -> io::Result<Child> {
            if stage_index == self.0 {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                command.spawn()
            }
        }
    }

    #[test]
    fn test_single_external_stage() {
        let (outcome, out) = run("echo a b  c", &Config::capturing());
        assert!(outcome.success());
        assert_eq!(out, "a b c\n");
        assert_eq!(outcome.observations.len(), 1);
        assert_eq!(outcome.observations[0].code, 0);
    }

    #[test]
    fn test_two_stage_pipe_delivers_all_bytes() {
        // larger than any pipe buffer, so the writer blocks until wc reads
        let (outcome, out) = run("seq 1 200000 | wc -l", &Config::capturing());
        assert!(outcome.success(), "{:?}", outcome.errors);
        assert_eq!(out.trim(), "200000");
    }

    #[test]
    fn test_three_stages_in_order() {
        let (outcome, out) = run("printf b\\na\\nc\\n | sort | head -n 2", &Config::capturing());
        assert!(outcome.success(), "{:?}", outcome.errors);
        assert_eq!(out, "a\nb\n");
        let stages: Vec<usize> = outcome.observations.iter().map(|o| o.stage_index).collect();
        assert_eq!(stages, vec![0, 1, 2]);
    }

    #[test]
    fn test_last_stage_output_wins() {
        let (outcome, out) = run("echo foo | echo bar", &Config::capturing());
        assert_eq!(out, "bar\n");
        // the first echo may or may not see the closed pipe, its status is not asserted
        assert_eq!(outcome.observations.last().map(|o| o.code), Some(0));
    }

    #[test]
    fn test_non_zero_exit_does_not_stop_collection() {
        let (outcome, out) = run("false | echo after", &Config::capturing());
        assert_eq!(out, "after\n");
        assert_eq!(outcome.observations.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            &outcome.errors[0],
            ShellError::StageExited { stage_index: 0, code: 1, .. }
        ));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_unknown_program_stops_starting() {
        let (outcome, _) = run("echo hi | no-such-program-xyz | wc -c", &Config::capturing());
        assert!(!outcome.success());
        // echo was started and waited, wc never started
        let started: Vec<usize> = outcome.observations.iter().map(|o| o.stage_index).collect();
        assert_eq!(started, vec![0]);
        assert!(outcome
            .errors
            .iter()
            .any(|e| matches!(e, ShellError::SpawnFailed { stage_index: 1, .. })));
        assert_eq!(outcome.exit_code(), 127);
    }

    #[test]
    fn test_spawn_failure_does_not_hang_started_writer() {
        // yes never stops on its own; it must die from the broken pipe
        let env = Environment::capture().unwrap();
        let pipeline = split_pipeline("yes | cat", PIPE).unwrap();
        let outcome = run_external(&pipeline, &env, &FailAt(1), &Config::capturing(), &mut Vec::<u8>::new());

        assert_eq!(outcome.observations.len(), 1);
        assert_ne!(outcome.observations[0].code, 0);
        assert!(matches!(
            outcome.errors.last(),
            Some(ShellError::SpawnFailed { stage_index: 1, .. })
        ));
        assert_eq!(outcome.exit_code(), 126);
    }

    #[test]
    fn test_terminate_started_policy_kills_earlier_stages() {
        let env = Environment::capture().unwrap();
        let pipeline = split_pipeline("sleep 30 | cat | cat", PIPE).unwrap();
        let config = Config {
            spawn_failure: SpawnFailurePolicy::TerminateStarted,
            ..Config::capturing()
        };
        let started = std::time::Instant::now();
        let outcome = run_external(&pipeline, &env, &FailAt(2), &config, &mut Vec::<u8>::new());

        assert!(started.elapsed() < std::time::Duration::from_secs(20));
        assert_eq!(outcome.observations.len(), 2);
        assert!(outcome.observations.iter().all(|o| o.code != 0));
    }

    struct ClosedWriter;

    impl Write for ClosedWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unwritable_capture_reported_once() {
        // yes dies of SIGPIPE once its reader is gone
        let env = Environment::capture().unwrap();
        let pipeline = split_pipeline("yes", PIPE).unwrap();
        let outcome = run_external(&pipeline, &env, &SystemLauncher, &Config::capturing(), &mut ClosedWriter);

        assert_eq!(outcome.errors.len(), 1, "{:?}", outcome.errors);
        assert!(matches!(
            &outcome.errors[0],
            ShellError::WriteFailed { command: "pipeshell", .. }
        ));
        assert_eq!(outcome.observations.len(), 1);
        assert_ne!(outcome.observations[0].code, 0);
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_stages_run_in_environment_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = std::fs::canonicalize(tmp.path()).unwrap();
        std::fs::write(dir.join("marker.txt"), b"").unwrap();

        let env = Environment::with_dir(&dir);
        let pipeline = split_pipeline("ls | grep marker", PIPE).unwrap();
        let mut out: Vec<u8> = Vec::new();
        let outcome = run_external(&pipeline, &env, &SystemLauncher, &Config::capturing(), &mut out);
        assert!(outcome.success(), "{:?}", outcome.errors);
        assert_eq!(String::from_utf8(out).unwrap(), "marker.txt\n");
    }
}
