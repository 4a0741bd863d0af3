//! Command: `package`.
use anyhow::{Context as _, Result};

use super::{Output, finish};
use crate::cli::PackageCommand;
use crate::engine::Engine;
use crate::logging;

/// Run a `package` subcommand.
///
/// # Errors
///
/// Returns the engine operation's error.
pub fn run(engine: &Engine, command: PackageCommand, output: Output) -> Result<()> {
    match command {
        PackageCommand::List { profile } => finish(engine.list_packages(&profile), output, |packages| {
            for p in packages {
                println!("{p}");
            }
        }),
        PackageCommand::Import {
            profile,
            name,
            source,
        } => {
            let cwd = std::env::current_dir().context("reading current directory")?;
            logging::stage(&format!("Importing {source} into {profile}/{name}"));
            finish(
                engine.import_package(&profile, &name, &source, &cwd),
                output,
                |report| println!("imported to {}", report.destination.display()),
            )
        }
        PackageCommand::Delete { profile, name } => {
            logging::stage(&format!("Deleting package {profile}/{name}"));
            finish(engine.delete_package(&profile, &name), output, |report| {
                println!(
                    "restored {} item(s); removed {profile}/{}",
                    report.restored, report.package
                );
            })
        }
    }
}
