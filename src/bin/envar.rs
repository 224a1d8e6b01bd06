use std::collections::BTreeMap;
use std::ffi::OsString;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use envar::{EnvLoader, Environment, Error, SubstitutionMode};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ENVAR_LOG";

#[derive(Parser)]
#[command(name = "envar")]
#[command(author, version, about = "Run commands with variables loaded from dotenv files")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Print loader diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load dotenv files and execute a command
    Run {
        #[command(flatten)]
        files: FileArgs,

        /// Override existing environment variables
        #[arg(short = 'o', long = "override", visible_alias = "overload")]
        override_existing: bool,

        /// Command to execute, followed by its arguments
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "COMMAND"
        )]
        command: Vec<OsString>,
    },
    /// Parse dotenv files and print the resolved variables
    Check {
        #[command(flatten)]
        files: FileArgs,
    },
}

#[derive(Args)]
struct FileArgs {
    /// Dotenv file path(s). Repeat or pass comma-separated paths. Defaults to .env
    #[arg(short, long = "file", value_name = "PATHS", value_delimiter = ',')]
    files: Vec<PathBuf>,

    /// Ignore missing dotenv files
    #[arg(short, long, visible_alias = "ignore")]
    ignore_missing: bool,

    /// Keep `$VAR` and `${VAR}` references literal
    #[arg(long)]
    no_expand: bool,
}

impl FileArgs {
    fn loader(&self) -> EnvLoader {
        let mode = if self.no_expand {
            SubstitutionMode::Disabled
        } else {
            SubstitutionMode::Expand
        };
        EnvLoader::new()
            .paths(&self.files)
            .required(!self.ignore_missing)
            .substitution_mode(mode)
    }
}

/// Variables staged for a child process, layered over the current environment.
#[derive(Default)]
struct ChildEnv {
    staged: BTreeMap<String, String>,
}

impl Environment for ChildEnv {
    fn has(&self, key: &str) -> bool {
        self.staged.contains_key(key) || std::env::var_os(key).is_some()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.staged.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("envar: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "envar=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run {
            files,
            override_existing,
            command,
        } => handle_run(&files, override_existing, &command),
        Commands::Check { files } => handle_check(&files),
    }
}

fn handle_run(files: &FileArgs, override_existing: bool, argv: &[OsString]) -> Result<ExitCode> {
    let Some((program, args)) = argv.split_first() else {
        anyhow::bail!("missing command after `run`");
    };

    let mut env = ChildEnv::default();
    files
        .loader()
        .override_existing(override_existing)
        .load(&mut env)
        .context("failed to load dotenv files")?;

    let mut command = Command::new(program);
    command.args(args).envs(&env.staged);
    execute_command(command, program)
}

fn handle_check(files: &FileArgs) -> Result<ExitCode> {
    let parsed = files
        .loader()
        .parse_only()
        .context("failed to parse dotenv files")?;

    // Load semantics: the first file to define a key wins.
    let mut merged = BTreeMap::new();
    for (_, env_map) in parsed {
        for (key, value) in env_map {
            merged.entry(key).or_insert(value);
        }
    }
    for (key, value) in &merged {
        let rendered = render_value(value)
            .with_context(|| format!("value of `{key}` cannot be written back as a dotenv line"))?;
        println!("{key}={rendered}");
    }

    Ok(ExitCode::SUCCESS)
}

/// Format a value so that reading it back, with substitution disabled,
/// yields the same string.
///
/// Values that need quoting are double-quoted with `"` escaped. A value
/// ending in `\` cannot be quoted at all, because the closing quote would
/// read as escaped; it is printed bare if that reads back, and `None` is
/// returned otherwise.
fn render_value(value: &str) -> Option<String> {
    let plain = !value.is_empty()
        && !value
            .chars()
            .any(|ch| ch.is_whitespace() || matches!(ch, '#' | '"' | '\'' | '\\'));
    if plain {
        return Some(value.to_owned());
    }
    if !value.ends_with('\\') {
        return Some(format!("\"{}\"", value.replace('"', "\\\"")));
    }

    let reads_back_bare = value.trim() == value
        && !value.starts_with(['"', '\''])
        && !value.contains(" #");
    reads_back_bare.then(|| value.to_owned())
}

#[cfg(unix)]
fn execute_command(mut command: Command, program: &OsString) -> Result<ExitCode> {
    let err = command.exec();
    Err(err).with_context(|| format!("failed to execute `{}`", program.to_string_lossy()))
}

#[cfg(not(unix))]
fn execute_command(mut command: Command, program: &OsString) -> Result<ExitCode> {
    let status = command
        .status()
        .with_context(|| format!("failed to execute `{}`", program.to_string_lossy()))?;
    let code = status.code().unwrap_or(1);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
