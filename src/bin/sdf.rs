// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use sdf::{
    config::Settings,
    path::{default_store_dir, home_dir, settings_file},
    store::Store,
    trace::{TraceRequest, Tracer},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use indicatif::ProgressBar;
use std::{
    ffi::OsString,
    fs::read_to_string,
    io::{stdout, ErrorKind, Write},
    path::PathBuf,
    pin::pin,
    process::exit,
    time::Duration,
};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  sdf [options] [<sdf-command>]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let settings = load_settings()?;
        match self.command.unwrap_or(Command::Status) {
            Command::Status => run_status(&settings),
            Command::Add(opts) => run_add(&settings, opts),
            Command::Rm(opts) => run_rm(&settings, opts),
            Command::Git(opts) => run_git(&settings, opts),
            Command::Init(opts) => run_init(&settings, opts).await,
            Command::New(opts) => run_new(&settings, opts),
            Command::Trace(opts) => run_trace(&settings, opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Show status of tracked files (default).
    #[command(override_usage = "sdf status")]
    Status,

    /// Add files to the store.
    #[command(override_usage = "sdf add <path>...")]
    Add(PathOptions),

    /// Remove files from the store.
    #[command(override_usage = "sdf rm <path>...")]
    Rm(PathOptions),

    /// Run Git binary directly on the store.
    #[command(override_usage = "sdf git <git-command>...")]
    Git(GitOptions),

    /// Restore configuration from existing remote repository.
    #[command(override_usage = "sdf init [options] <url>")]
    Init(InitOptions),

    /// Initialize new configuration with default remote.
    #[command(override_usage = "sdf new [options] <url>")]
    New(InitOptions),

    /// Show files in home directory that a program opens.
    #[command(override_usage = "sdf trace [options] <program> [<args>]...")]
    Trace(TraceOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PathOptions {
    /// Paths of files to add or remove.
    #[arg(required = true, value_name = "path")]
    pub paths: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GitOptions {
    /// Git command to run.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "git-command"
    )]
    pub args: Vec<OsString>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// URL of remote repository.
    #[arg(value_name = "url")]
    pub url: String,

    /// Replace existing store.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TraceOptions {
    /// Kill traced program after this many seconds.
    #[arg(short, long, value_name = "seconds")]
    pub timeout: Option<u64>,

    /// Program to trace, followed by its arguments.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "program"
    )]
    pub command: Vec<OsString>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn load_settings() -> Result<Settings> {
    let path = settings_file()?;
    match read_to_string(&path) {
        Ok(data) => data
            .parse()
            .with_context(|| format!("invalid settings file {:?}", path.display())),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            debug!("no settings file at {:?}, use defaults", path.display());
            Ok(Settings::default())
        }
        Err(error) => {
            Err(error).with_context(|| format!("cannot read settings file {:?}", path.display()))
        }
    }
}

fn open_store(settings: &Settings) -> Result<Store> {
    let git_dir = match &settings.store.git_dir {
        Some(path) => path.clone(),
        None => default_store_dir()?,
    };

    Ok(Store::new(git_dir, work_tree(settings)?))
}

fn work_tree(settings: &Settings) -> Result<PathBuf> {
    match &settings.store.work_tree {
        Some(path) => Ok(path.clone()),
        None => Ok(home_dir()?),
    }
}

fn run_status(settings: &Settings) -> Result<()> {
    open_store(settings)?.status()?;
    Ok(())
}

fn run_add(settings: &Settings, opts: PathOptions) -> Result<()> {
    open_store(settings)?.add(opts.paths)?;
    Ok(())
}

fn run_rm(settings: &Settings, opts: PathOptions) -> Result<()> {
    open_store(settings)?.remove(opts.paths)?;
    Ok(())
}

fn run_git(settings: &Settings, opts: GitOptions) -> Result<()> {
    open_store(settings)?.gitcall_interactive(opts.args)?;
    Ok(())
}

async fn run_init(settings: &Settings, opts: InitOptions) -> Result<()> {
    let store = open_store(settings)?;
    let bar = ProgressBar::no_length();
    tokio::task::spawn_blocking(move || store.init_from_remote(opts.url, opts.force, bar))
        .await??;
    info!("restored configuration, activate it with 'sdf git checkout .'");

    Ok(())
}

fn run_new(settings: &Settings, opts: InitOptions) -> Result<()> {
    open_store(settings)?.init_new(opts.url, opts.force)?;
    info!("initialized new configuration");

    Ok(())
}

async fn run_trace(settings: &Settings, opts: TraceOptions) -> Result<()> {
    let request = TraceRequest::try_from_tokens(opts.command)?;
    let deadline = opts
        .timeout
        .map(Duration::from_secs)
        .or(settings.trace.deadline());
    let tracer = Tracer::new(work_tree(settings)?)
        .with_tracer(&settings.trace.tracer)
        .with_filter_args(&settings.trace.filter)
        .with_deadline(deadline);

    let trace = match tracer.trace(request) {
        Ok(trace) => trace,
        Err(error) if error.is_precondition() => {
            error!("{error}");
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    let mut out = stdout();
    let mut candidates = pin!(trace.into_stream());
    while let Some(candidate) = candidates.try_next().await? {
        match writeln!(out, "{candidate}").and_then(|_| out.flush()) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::BrokenPipe => {
                // INVARIANT: Reader went away, dropping the trace kills the child.
                debug!("stdout closed, stop tracing");
                break;
            }
            Err(error) => return Err(error).context("cannot write trace output"),
        }
    }

    Ok(())
}
