use crate::error::{Result, ShellError};
use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};

/// Interpreter state shared by built-ins and spawned processes.
///
/// The environment contains:
/// - `vars`: environment variables handed to every spawned process.
/// - `current_dir`: the working directory, read by `pwd`, written by `cd`
///   and passed to every process at spawn time.
///
/// The host process's own working directory is never changed, so two
/// interpreters in one process do not see each other's `cd`.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// Copies variables from `std::env::vars()` and the working directory from
    /// `std::env::current_dir()`.
    pub fn capture() -> Result<Self> {
        let current_dir =
            stdenv::current_dir().map_err(|cause| ShellError::DirectoryQueryFailed { cause })?;
        Ok(Self::with_dir(current_dir))
    }

    /// Process variables with an explicit working directory.
    pub fn with_dir(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: stdenv::vars().collect(),
            current_dir: current_dir.into(),
        }
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override an environment variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Make `path` absolute relative to the current directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }
}
