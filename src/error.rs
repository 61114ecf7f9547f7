use crate::command::ExitCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShellError>;

/// Everything that can go wrong while running a command line.
///
/// None of these are fatal to the interpreter: built-in errors are reported
/// as a single diagnostic, pipeline errors are collected per stage.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("syntax error: stage {} of the pipeline is empty", .index + 1)]
    EmptyStage { index: usize },

    #[error("{command}: missing argument")]
    MissingArgument { command: &'static str },

    #[error("{command}: {message}")]
    Usage {
        command: &'static str,
        message: String,
    },

    #[error("{command}: write error: {cause}")]
    WriteFailed {
        command: &'static str,
        cause: io::Error,
    },

    #[error("kill: invalid process id `{value}`")]
    InvalidProcessId { value: String },

    #[error("kill: ({pid}) - no such process")]
    ProcessNotFound { pid: i32 },

    #[error("kill: ({pid}) - {cause}")]
    TerminationFailed { pid: i32, cause: io::Error },

    #[error("cd: {}: {cause}", .path.display())]
    DirectoryChangeFailed { path: PathBuf, cause: io::Error },

    #[error("pwd: {cause}")]
    DirectoryQueryFailed { cause: io::Error },

    #[error("ps: {cause}")]
    SubprocessFailed { cause: io::Error },

    #[error("{program}: {}", spawn_message(.cause))]
    SpawnFailed {
        stage_index: usize,
        program: String,
        cause: io::Error,
    },

    #[error("stage {}: failed to wait: {cause}", .stage_index + 1)]
    WaitFailed { stage_index: usize, cause: io::Error },

    #[error("{program}: exited with status {code}")]
    StageExited {
        stage_index: usize,
        program: String,
        code: ExitCode,
    },
}

fn spawn_message(cause: &io::Error) -> String {
    match cause.kind() {
        io::ErrorKind::NotFound => "command not found".to_string(),
        _ => cause.to_string(),
    }
}

impl ShellError {
    /// Index of the pipeline stage this error belongs to, if any.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            Self::EmptyStage { index } => Some(*index),
            Self::SpawnFailed { stage_index, .. }
            | Self::WaitFailed { stage_index, .. }
            | Self::StageExited { stage_index, .. } => Some(*stage_index),
            _ => None,
        }
    }

    /// Exit code a shell would report for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Usage { .. } | Self::EmptyStage { .. } => 2,
            Self::SpawnFailed { cause, .. } if cause.kind() == io::ErrorKind::NotFound => 127,
            Self::SpawnFailed { .. } => 126,
            Self::StageExited { code, .. } => *code,
            _ => 1,
        }
    }

    pub(crate) fn spawn_failed(stage_index: usize, program: &str, cause: io::Error) -> Self {
        Self::SpawnFailed {
            stage_index,
            program: program.to_string(),
            cause,
        }
    }
}
