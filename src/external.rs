use crate::command::{ExitCode, Stage, exit_code_of};
use crate::env::Environment;
use crate::error::{Result, ShellError};
use log::debug;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

/// Hook through which every external pipeline stage is started.
///
/// The default [`SystemLauncher`] just spawns the prepared command; tests swap
/// in their own implementation to observe or fail spawns.
pub trait Launcher {
    fn launch(&self, stage_index: usize, command: &mut Command) -> io::Result<Child>;
}

/// Spawns commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, _stage_index: usize, command: &mut Command) -> io::Result<Child> {
        command.spawn()
    }
}

/// A started external stage.
///
/// Owns the child together with whatever endpoints were left piped. Dropping
/// the handle closes them; it does not wait for or kill the process.
#[derive(Debug)]
pub struct ProcessHandle {
    stage_index: usize,
    program: String,
    child: Child,
}

impl ProcessHandle {
    /// Resolve and start `stage` with the given stdio endpoints.
    ///
    /// The endpoints are moved into the command and released when it is
    /// dropped at the end of this call, whether the spawn succeeded or not,
    /// so the interpreter never keeps a copy of a pipe end it handed out.
    pub fn spawn(
        launcher: &dyn Launcher,
        env: &Environment,
        stage_index: usize,
        stage: &Stage,
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Self> {
        let search_paths = env.get_var("PATH").map(OsStr::new);
        let executable =
            find_command_path(search_paths, &env.current_dir, Path::new(&stage.program))
                .ok_or_else(|| {
                    ShellError::spawn_failed(
                        stage_index,
                        &stage.program,
                        io::Error::from(io::ErrorKind::NotFound),
                    )
                })?;
        debug!("stage {stage_index}: resolved `{}` to {}", stage.program, executable.display());

        let mut command = Command::new(&executable);
        command
            .args(&stage.args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .env_clear()
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir);

        let child = launcher
            .launch(stage_index, &mut command)
            .map_err(|cause| ShellError::spawn_failed(stage_index, &stage.program, cause))?;
        debug!("stage {stage_index}: `{}` started as pid {}", stage.program, child.id());

        Ok(Self {
            stage_index,
            program: stage.program.clone(),
            child,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Take the read end of the stage's stdout, if it was piped.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Forcefully stop the process. Already exited processes are not an error.
    pub fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }

    /// Wait for the process to exit, closing any endpoints still held.
    pub fn wait(mut self) -> Result<ExitCode> {
        drop(self.child.stdin.take());
        drop(self.child.stdout.take());
        let status = self.child.wait().map_err(|cause| ShellError::WaitFailed {
            stage_index: self.stage_index,
            cause,
        })?;
        Ok(exit_code_of(status))
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an existing file.
/// - Relative with multiple components (e.g., `bin/sh`): resolved against `cwd`.
/// - `./foo` on Unix or any `./`-prefixed path on other platforms: resolved against `cwd`.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path or no match: returns `None`.
pub fn find_command_path(search_paths: Option<&OsStr>, cwd: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path.to_path_buf());
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir {
        if let Some(found) = find_by_path(cwd.join(path)) {
            return Some(found);
        }
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths?, cwd, x.as_os_str()),
        _ => find_by_path(cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cwd: &Path, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| if dir.is_absolute() { dir } else { cwd.join(dir) })
        .find_map(|dir| find_by_path(dir.join(cmd)))
}

fn find_by_path(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    #[cfg(unix)]
    fn osstr(s: &str) -> Option<&OsStr> {
        Some(OsStr::new(s))
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), Path::new("/"), path);
        assert_eq!(found.as_deref(), Some(path));
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(osstr("/bin"), Path::new("/"), path);
        assert!(res.is_none(), "Expected not to find /bin/nonexisting via absolute path");
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nowhere:/bin"), Path::new("/"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found, PathBuf::from("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("/"), Path::new("nonexisting"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    fn single_component_without_path_variable() {
        assert!(find_command_path(None, Path::new("/"), Path::new("sh")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn multiple_components_resolve_against_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("bin")).unwrap();
        File::create(tmp.path().join("bin").join("tool")).unwrap();

        // the host cwd is irrelevant, only the interpreter's directory counts
        let found = find_command_path(osstr("/does/not/matter"), tmp.path(), Path::new("bin/tool"))
            .expect("Expected to find relative 'bin/tool'");
        assert_eq!(found, tmp.path().join("bin/tool"));
    }

    #[test]
    #[cfg(unix)]
    fn current_dir_with_dot_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        File::create(tmp.path().join("foo")).unwrap();

        let found = find_command_path(osstr("/bin"), tmp.path(), Path::new("./foo"))
            .expect("Expected to find './foo' in current dir");
        assert!(found.ends_with("foo"));
        assert!(found.starts_with(tmp.path()));
    }

    #[test]
    #[cfg(unix)]
    fn directories_are_not_commands() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sh")).unwrap();
        let search = tmp.path().as_os_str().to_owned();
        assert!(find_command_path(Some(&search), Path::new("/"), Path::new("sh")).is_none());
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(Some(OsStr::new("/bin")), Path::new("/"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    #[test]
    #[cfg(unix)]
    fn unknown_program_fails_before_launch() {
        struct Never;
        impl Launcher for Never {
            fn launch(&self, _: usize, _: &mut Command) -> io::Result<Child> {
                panic!("launcher must not be reached");
            }
        }

        let env = Environment::with_dir("/");
        let stage = Stage::new("definitely-not-a-real-program-42", Vec::new());
        let err = ProcessHandle::spawn(&Never, &env, 3, &stage, Stdio::null(), Stdio::null())
            .unwrap_err();
        match err {
            ShellError::SpawnFailed { stage_index, program, cause } => {
                assert_eq!(stage_index, 3);
                assert_eq!(program, "definitely-not-a-real-program-42");
                assert_eq!(cause.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn spawned_stage_runs_in_interpreter_dir() {
        use std::io::Read;

        let tmp = tempfile::tempdir().unwrap();
        let dir = fs::canonicalize(tmp.path()).unwrap();
        let env = Environment::with_dir(&dir);
        let stage = Stage::new("pwd", Vec::new());

        let mut handle =
            ProcessHandle::spawn(&SystemLauncher, &env, 0, &stage, Stdio::null(), Stdio::piped())
                .unwrap();
        let mut out = String::new();
        handle.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(handle.wait().unwrap(), 0);
        assert_eq!(out.trim_end(), dir.to_string_lossy());
    }
}
