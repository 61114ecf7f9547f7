use crate::builtin::Builtin;
use crate::command::{ExitCode, Pipeline, Stage};
use crate::config::Config;
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::external::{Launcher, SystemLauncher};
use crate::lexer;
use crate::pipeline::{self, PipelineOutcome};
use log::{debug, error};
use std::io::{self, Write};

/// A minimal shell-like interpreter that runs built-in and external commands.
///
/// The interpreter owns its [`Environment`] (working directory and variables),
/// its [`Config`] and the [`Launcher`] every external stage is spawned
/// through. It does not read input itself: callers hand it one line at a time.
///
/// Example
/// ```
/// use pipeshell::{Config, Interpreter};
/// let mut sh = Interpreter::new(Config::capturing()).unwrap();
/// let mut out: Vec<u8> = Vec::new();
/// let code = sh.execute_line_with_output("echo hello   world", &mut out, &mut Vec::<u8>::new());
/// assert_eq!(code, 0);
/// assert_eq!(out, b"hello world\n");
/// ```
pub struct Interpreter {
    env: Environment,
    config: Config,
    launcher: Box<dyn Launcher>,
}

impl Interpreter {
    /// Create an interpreter starting in the host's current directory.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::with_env(config, Environment::capture()?))
    }

    pub fn with_env(config: Config, env: Environment) -> Self {
        Self {
            env,
            config,
            launcher: Box::new(SystemLauncher),
        }
    }

    /// Replace the hook used to spawn external stages.
    pub fn with_launcher(mut self, launcher: Box<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one line against the process's stdout and stderr.
    pub fn execute_line(&mut self, line: &str) -> ExitCode {
        self.execute_line_with_output(line, &mut io::stdout(), &mut io::stderr())
    }

    /// Execute one line, writing built-in (and captured) output to `out` and
    /// one diagnostic per failure to `err`.
    ///
    /// Never fails: the returned exit code tells whether the line succeeded.
    pub fn execute_line_with_output(
        &mut self,
        line: &str,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> ExitCode {
        let pipeline = match lexer::split_pipeline(line.trim(), self.config.separator) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                report(err, &e);
                return e.exit_code();
            }
        };

        match self.run_pipeline(&pipeline, out) {
            Ok(outcome) => {
                for e in &outcome.errors {
                    report(err, e);
                }
                outcome.exit_code()
            }
            Err(e) => {
                report(err, &e);
                e.exit_code()
            }
        }
    }

    /// Run a single command invocation by name with arguments.
    pub fn run(&mut self, name: &str, args: &[&str], out: &mut dyn Write) -> Result<PipelineOutcome> {
        let stage = Stage::new(name, args.iter().map(|a| a.to_string()).collect());
        self.run_pipeline(&Pipeline::single(stage), out)
    }

    /// Run an already split pipeline.
    ///
    /// A single stage naming a built-in runs in-process and its error, if
    /// any, is returned as `Err`. Everything else is spawned; per-stage
    /// failures are collected in the returned outcome.
    pub fn run_pipeline(
        &mut self,
        pipeline: &Pipeline,
        out: &mut dyn Write,
    ) -> Result<PipelineOutcome> {
        if let Some(stage) = pipeline.as_single() {
            if let Some(builtin) = Builtin::lookup(&stage.program) {
                debug!("running built-in `{}`", builtin.name());
                builtin.execute(&stage.arg_refs(), out, &mut self.env, &self.config)?;
                return Ok(PipelineOutcome::default());
            }
        }

        // keep built-in output ahead of whatever the children print
        out.flush().map_err(|cause| ShellError::WriteFailed {
            command: "pipeshell",
            cause,
        })?;
        Ok(pipeline::run_external(
            pipeline,
            &self.env,
            &*self.launcher,
            &self.config,
            out,
        ))
    }
}

fn report(err: &mut dyn Write, e: &ShellError) {
    if let Err(write_error) = writeln!(err, "pipeshell: {e}") {
        error!("cannot report `{e}`: {write_error}");
    }
}
