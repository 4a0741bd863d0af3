//! `dotman` command-line entry point.
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use dotman::cli::{Cli, Command};
use dotman::commands::{self, Output};
use dotman::config::{Overrides, Settings};
use dotman::engine::Engine;
use dotman::exec::{CancelToken, SystemExecutor};
use dotman::logging;

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<()> {
    match args.command {
        Command::Version => {
            commands::version::run();
            return Ok(());
        }
        Command::Completions { shell } => {
            commands::completions::run(shell);
            return Ok(());
        }
        _ => {}
    }

    let output = if args.global.json {
        Output::Json
    } else {
        Output::Text
    };
    let overrides = Overrides {
        root: args.global.root.clone(),
        home: args.global.home.clone(),
        timeout_secs: args.global.timeout,
    };
    let settings = match Settings::resolve(&overrides) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init_subscriber(args.verbose, None, output == Output::Json);
            return Err(e);
        }
    };
    logging::init_subscriber(
        args.verbose,
        Some(&settings.log_file()),
        output == Output::Json,
    );
    tracing::debug!(
        "root={} home={}",
        settings.root.display(),
        settings.home.display()
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!("could not install Ctrl-C handler: {e}");
    }

    let executor = Arc::new(SystemExecutor::new(settings.timeout, cancel.clone()));
    let engine = Engine::new(settings, executor, cancel).with_sink(logging::transcript_sink());
    commands::dispatch(&engine, args.command, output)
}
