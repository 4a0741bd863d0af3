//! Command: `profile`.
use anyhow::Result;

use super::{Output, finish};
use crate::cli::ProfileCommand;
use crate::engine::Engine;
use crate::link::DeleteMode;
use crate::logging;

/// Run a `profile` subcommand.
///
/// # Errors
///
/// Returns the engine operation's error.
pub fn run(engine: &Engine, command: ProfileCommand, output: Output) -> Result<()> {
    match command {
        ProfileCommand::List => finish(engine.list_profiles(), output, |profiles| {
            for p in profiles {
                println!("{p}");
            }
        }),
        ProfileCommand::Create { name } => {
            logging::stage(&format!("Creating profile {name}"));
            finish(engine.create_profile(&name), output, |dir| {
                println!("created {}", dir.display());
            })
        }
        ProfileCommand::Apply { name } => {
            logging::stage(&format!("Applying profile {name}"));
            finish(engine.apply_profile(&name), output, |links| {
                for link in links {
                    match &link.backup {
                        Some(b) => println!(
                            "linked {} (backed up {} path(s) to {})",
                            link.package,
                            b.moved.len(),
                            b.dir.display()
                        ),
                        None => println!("linked {}", link.package),
                    }
                }
            })
        }
        ProfileCommand::Delete(opts) => {
            let mode = if opts.restore {
                DeleteMode::Restore
            } else {
                DeleteMode::Destructive
            };
            logging::stage(&format!("Deleting profile {}", opts.name));
            finish(engine.delete_profile(&opts.name, mode), output, |reports| {
                for r in reports {
                    println!("restored {} item(s) from {}", r.restored, r.package);
                }
                println!("deleted {}", opts.name);
            })
        }
        ProfileCommand::Current => finish(engine.current_profile(), output, |current| {
            println!("{}", current.as_deref().unwrap_or("(none)"));
        }),
    }
}
