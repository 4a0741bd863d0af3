//! Command: `storage`.
use anyhow::{Context as _, Result};

use super::{Output, finish};
use crate::cli::StorageCommand;
use crate::engine::Engine;
use crate::logging;
use crate::storage::StorageDelete;

/// Run a `storage` subcommand.
///
/// # Errors
///
/// Returns the engine operation's error.
pub fn run(engine: &Engine, command: StorageCommand, output: Output) -> Result<()> {
    match command {
        StorageCommand::List => finish(engine.list_storage(), output, |items| {
            for item in items {
                match &item.origin {
                    Some(origin) => println!("{}\t{}", item.name, origin.display()),
                    None => println!("{}", item.name),
                }
            }
        }),
        StorageCommand::Add { name, source } => {
            let cwd = std::env::current_dir().context("reading current directory")?;
            logging::stage(&format!("Storing {source} as {name}"));
            finish(engine.add_storage(&name, &source, &cwd), output, |entry| {
                println!("stored {}", entry.name);
            })
        }
        StorageCommand::Delete { name, purge } => {
            let mode = if purge {
                StorageDelete::Purge
            } else {
                StorageDelete::Restore
            };
            logging::stage(&format!("Deleting storage item {name}"));
            finish(engine.delete_storage(&name, mode), output, |restored| match restored {
                Some(origin) => println!("restored to {}", origin.display()),
                None => println!("purged {name}"),
            })
        }
    }
}
