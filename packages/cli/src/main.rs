mod commands;
mod config;
mod packages;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, init, render, CheckArgs, InitArgs, RenderArgs};
use config::Config;
use std::path::{Path, PathBuf};

/// Sprig CLI - render and check reactive templates
#[derive(Parser, Debug)]
#[command(name = "sprig")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to sprig.config.json in the working directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Tracing filter, overriding the config's logLevel (RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new Sprig project
    Init(InitArgs),

    /// Load a template with data and print the rendered markup
    Render(RenderArgs),

    /// Parse templates and report malformed directives and expressions
    Check(CheckArgs),
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

fn run(cli: Cli, cwd: &Path) -> anyhow::Result<()> {
    let config = match cli.command {
        Command::Init(_) => Config::default(),
        _ => Config::load(cwd, cli.config.as_deref())?,
    };
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Command::Init(args) => init(args, cwd),
        Command::Render(args) => render(args, &config, cwd),
        Command::Check(args) => check(args, &config, cwd),
    }
}

fn main() {
    let cli = Cli::parse();

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| run(cli, &cwd));

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
