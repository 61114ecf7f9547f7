use anyhow::{Context, Result};
use argh::FromArgs;
use log::{LevelFilter, debug};
use pipeshell::{Config, Interpreter, OutputMode, SpawnFailurePolicy};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

#[derive(FromArgs)]
/// a small interactive shell: built-ins plus pipelines of external programs.
struct Args {
    #[argh(option)]
    /// prompt printed before every line.
    prompt: Option<String>,

    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status.
    command: Option<String>,

    #[argh(switch)]
    /// copy the last stage's output through the shell instead of handing it the terminal.
    capture: bool,

    #[argh(switch)]
    /// kill already started stages when a later stage cannot be started.
    terminate_on_spawn_failure: bool,

    #[argh(switch, short = 'v')]
    /// log what the shell does; RUST_LOG takes precedence.
    verbose: bool,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(prompt) = &self.prompt {
            config.prompt = prompt.clone();
        }
        if self.capture {
            config.output = OutputMode::Capture;
        }
        if self.terminate_on_spawn_failure {
            config.spawn_failure = SpawnFailurePolicy::TerminateStarted;
        }
        config
    }
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    let mut sh = Interpreter::new(args.config()).context("cannot determine working directory")?;

    match &args.command {
        Some(line) => std::process::exit(sh.execute_line(line)),
        None => repl(&mut sh),
    }
}

/// Read-eval loop: one trimmed line per iteration until the quit token,
/// end of input or an interrupt.
fn repl(sh: &mut Interpreter) -> Result<()> {
    let mut rl = DefaultEditor::new().context("cannot initialise line editor")?;

    loop {
        match rl.readline(&sh.config().prompt) {
            Ok(input) => {
                let line = input.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;
                if line == sh.config().quit_token {
                    break;
                }
                let code = sh.execute_line(line);
                debug!("`{line}` exited with {code}");
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("cannot read input"),
        }
    }

    Ok(())
}
