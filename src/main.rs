mod backend;
mod cli;
mod commands;
mod config;
mod paths;
mod runner;
mod sudo;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Host selected with `--host`
    pub host: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        ui::error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        host: cli.host,
    };
    log::trace!("verbose={} quiet={}", ctx.verbose, ctx.quiet);

    match cli.command {
        Command::Status(args) => commands::status::run(&ctx, &args),
        Command::Sync(args) => commands::sync::run(&ctx, &args),
        Command::Update(args) => commands::update::run(&ctx, &args),
        Command::Hook(cmd) => commands::hook::run(&ctx, &cmd),
        Command::Merge(args) => commands::merge::run(&ctx, &args),
        Command::Module(cmd) => commands::module::run(&ctx, &cmd),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "hostform", &mut io::stdout());
            Ok(())
        }
    }
}
