use crate::config::Config;
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::registry;
use argh::{EarlyExit, FromArgs};
use log::info;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

/// Commands executed inside the interpreter, without spawning a process.
///
/// Looked up by the first token of a single-stage line. Each variant owns its
/// argument validation; `cd`, `pwd`, `ps` and `kill` are parsed with
/// [`argh`], `echo` takes its arguments verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Pwd,
    Echo,
    Ps,
    Kill,
}

impl Builtin {
    pub const ALL: [Builtin; 5] = [Self::Cd, Self::Pwd, Self::Echo, Self::Ps, Self::Kill];

    /// Find the built-in called `name`. Names are case-sensitive.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Canonical name of the command, e.g. "echo" or "cd".
    pub fn name(self) -> &'static str {
        match self {
            Self::Cd => "cd",
            Self::Pwd => "pwd",
            Self::Echo => "echo",
            Self::Ps => "ps",
            Self::Kill => "kill",
        }
    }

    /// Validate `args` and run the command.
    ///
    /// Output goes to `stdout`. On error nothing about the environment has
    /// changed.
    pub fn execute(
        self,
        args: &[&str],
        stdout: &mut dyn Write,
        env: &mut Environment,
        config: &Config,
    ) -> Result<()> {
        let name = self.name();
        match self {
            Self::Cd => run_parsed::<Cd>(name, args, stdout, env, config),
            Self::Pwd => run_parsed::<Pwd>(name, args, stdout, env, config),
            Self::Ps => run_parsed::<Ps>(name, args, stdout, env, config),
            Self::Kill => run_parsed::<Kill>(name, args, stdout, env, config),
            Self::Echo => Echo::from(args).execute(stdout, env, config),
        }
    }
}

/// Execution contract shared by every built-in.
trait BuiltinCommand {
    const NAME: &'static str;
    /// Arguments are operands only, so `-logs` or `-5` is never read as a flag.
    /// `--help` on its own still prints usage.
    const OPERANDS_ONLY: bool = false;

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment, config: &Config)
    -> Result<()>;
}

fn run_parsed<T: BuiltinCommand + FromArgs>(
    name: &'static str,
    args: &[&str],
    stdout: &mut dyn Write,
    env: &mut Environment,
    config: &Config,
) -> Result<()> {
    let operands: Vec<&str>;
    let args = if T::OPERANDS_ONLY && !matches!(args, ["--help"]) {
        operands = std::iter::once("--").chain(args.iter().copied()).collect();
        operands.as_slice()
    } else {
        args
    };

    match T::from_args(&[name], args) {
        Ok(cmd) => cmd.execute(stdout, env, config),
        // --help
        Err(EarlyExit {
            output,
            status: Ok(()),
        }) => writeln!(stdout, "{}", output.trim_end()).map_err(write_failed(name)),
        Err(EarlyExit {
            output,
            status: Err(()),
        }) => Err(ShellError::Usage {
            command: name,
            message: output.lines().next().unwrap_or_default().to_string(),
        }),
    }
}

fn write_failed(command: &'static str) -> impl Fn(io::Error) -> ShellError {
    move |cause| ShellError::WriteFailed { command, cause }
}

#[derive(FromArgs)]
/// print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    const NAME: &'static str = "pwd";

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment, _config: &Config) -> Result<()> {
        // a directory removed underneath us is reported like getcwd(3) would
        fs::metadata(&env.current_dir).map_err(|cause| ShellError::DirectoryQueryFailed { cause })?;
        writeln!(stdout, "{}", env.current_dir.display()).map_err(write_failed(Self::NAME))
    }
}

#[derive(FromArgs)]
/// change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    const NAME: &'static str = "cd";
    const OPERANDS_ONLY: bool = true;

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment, _config: &Config) -> Result<()> {
        let target = PathBuf::from(self.target.ok_or(ShellError::MissingArgument {
            command: Self::NAME,
        })?);
        let failed = |cause| ShellError::DirectoryChangeFailed {
            path: target.clone(),
            cause,
        };

        let canonical = fs::canonicalize(env.resolve(&target)).map_err(failed)?;
        if !canonical.is_dir() {
            return Err(failed(io::Error::other("Not a directory")));
        }

        info!("cd: {}", canonical.display());
        env.current_dir = canonical;
        Ok(())
    }
}

/// Write the arguments to standard output, separated by single spaces.
pub struct Echo {
    pub args: Vec<String>,
}

impl From<&[&str]> for Echo {
    fn from(args: &[&str]) -> Self {
        Self {
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl BuiltinCommand for Echo {
    const NAME: &'static str = "echo";

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment, _config: &Config) -> Result<()> {
        writeln!(stdout, "{}", self.args.join(" ")).map_err(write_failed(Self::NAME))
    }
}

#[derive(FromArgs)]
/// list the processes running on this host.
pub struct Ps {}

impl BuiltinCommand for Ps {
    const NAME: &'static str = "ps";

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment, config: &Config) -> Result<()> {
        registry::list_processes(&config.listing, stdout)
    }
}

#[derive(FromArgs)]
/// send a termination signal to a process.
pub struct Kill {
    #[argh(positional)]
    /// id of the process to terminate.
    pub pid: Option<String>,
}

impl BuiltinCommand for Kill {
    const NAME: &'static str = "kill";
    const OPERANDS_ONLY: bool = true;

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment, _config: &Config) -> Result<()> {
        let value = self.pid.ok_or(ShellError::MissingArgument {
            command: Self::NAME,
        })?;
        let pid = registry::parse_pid(&value)?;
        registry::terminate(pid)?;
        writeln!(stdout, "terminated process {pid}").map_err(write_failed(Self::NAME))
    }
}
