//! The command-execution core of a tiny shell.
//!
//! A line of input is split into pipeline stages ([`lexer`]). A single stage
//! naming a built-in (`cd`, `pwd`, `echo`, `ps`, `kill`) runs inside the
//! interpreter; anything else is started as external processes joined by OS
//! pipes, all started before any is waited on ([`pipeline`]). Failures are
//! collected per stage and never end the interpreter.
//!
//! The main entry point is [`Interpreter`]. Reading input, prompting and
//! deciding when to quit are left to the caller; the `pipeshell` binary is
//! one such caller.

pub mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod external;
mod interpreter;
pub mod lexer;
pub mod pipeline;
pub mod registry;

pub use command::{ExitCode, Pipeline, Stage};
pub use config::{Config, OutputMode, SpawnFailurePolicy};
pub use env::Environment;
pub use error::ShellError;
pub use external::{Launcher, ProcessHandle, SystemLauncher};
/// Just a convenient re-export of the command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
pub use pipeline::{ExitObservation, PipelineOutcome};
