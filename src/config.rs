//! Interpreter configuration.

use crate::lexer::PIPE;

/// Where the standard output of the last pipeline stage goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Last stage writes straight to the interpreter's own stdout.
    #[default]
    Inherit,
    /// Last stage writes to a pipe that is copied into the caller's writer.
    Capture,
}

/// What to do with already running stages when a later stage cannot start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpawnFailurePolicy {
    /// Leave them running and wait for them as usual.
    #[default]
    Leave,
    /// Kill every started stage, then wait for them.
    TerminateStarted,
}

/// Host command used by the `ps` built-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ListingCommand {
    #[cfg(windows)]
    fn default() -> Self {
        Self {
            program: "tasklist".to_string(),
            args: Vec::new(),
        }
    }

    #[cfg(not(windows))]
    fn default() -> Self {
        Self {
            program: "ps".to_string(),
            args: vec!["-e".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Prompt printed by the interactive loop.
    pub prompt: String,
    /// Line that ends the interactive loop.
    pub quit_token: String,
    /// Character separating pipeline stages.
    pub separator: char,
    pub output: OutputMode,
    pub spawn_failure: SpawnFailurePolicy,
    pub listing: ListingCommand,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: "pipeshell> ".to_string(),
            quit_token: "\\quit".to_string(),
            separator: PIPE,
            output: OutputMode::default(),
            spawn_failure: SpawnFailurePolicy::default(),
            listing: ListingCommand::default(),
        }
    }
}

impl Config {
    /// Default configuration with captured output, handy for embedding.
    pub fn capturing() -> Self {
        Self {
            output: OutputMode::Capture,
            ..Self::default()
        }
    }
}
