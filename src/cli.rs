//! Command-line definition.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Top-level CLI entry point.
#[derive(Parser, Debug)]
#[command(
    name = "dotman",
    about = "Profile-based dotfiles manager built on git and GNU stow",
    version
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Override the dotfiles repository root
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Override the home directory packages are linked into
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Per-command timeout in seconds (0 disables)
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage profiles
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Manage packages inside a profile
    #[command(subcommand)]
    Package(PackageCommand),
    /// Manage storage items
    #[command(subcommand)]
    Storage(StorageCommand),
    /// Synchronise the repository with its remote
    Sync,
    /// Show repository status
    Status(StatusOpts),
    /// Discard local changes to a repository file
    Reset {
        /// Path relative to the repository root
        file: String,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
    /// Print version information
    Version,
}

/// `profile` subcommands.
#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// List profiles
    List,
    /// Create a profile
    Create {
        /// Profile name
        name: String,
    },
    /// Link every package of a profile into the home directory
    Apply {
        /// Profile name
        name: String,
    },
    /// Delete a profile
    Delete(DeleteProfileOpts),
    /// Show the last applied profile
    Current,
}

/// Options for `profile delete`.
#[derive(Args, Debug, Clone)]
#[command(group(clap::ArgGroup::new("mode").required(true).args(["restore", "force"])))]
pub struct DeleteProfileOpts {
    /// Profile name
    pub name: String,

    /// Unlink every package and move its files back into the home directory
    #[arg(long)]
    pub restore: bool,

    /// Delete the profile directory without unlinking or restoring anything
    #[arg(long)]
    pub force: bool,
}

/// `package` subcommands.
#[derive(Subcommand, Debug)]
pub enum PackageCommand {
    /// List packages of a profile
    List {
        /// Profile name
        profile: String,
    },
    /// Move a path from the home directory into a new package and link it
    Import {
        /// Profile name
        profile: String,
        /// New package name
        name: String,
        /// Path to import (`~` expands to the home directory)
        source: String,
    },
    /// Unlink a package and move its files back into the home directory
    Delete {
        /// Profile name
        profile: String,
        /// Package name
        name: String,
    },
}

/// `storage` subcommands.
#[derive(Subcommand, Debug)]
pub enum StorageCommand {
    /// List storage items
    List,
    /// Move a path into storage and leave a symlink in its place
    Add {
        /// Storage item name
        name: String,
        /// Path to store (`~` expands to the home directory)
        source: String,
    },
    /// Move a storage item back to where it came from
    Delete {
        /// Storage item name
        name: String,
        /// Delete the item from the repository instead of restoring it
        #[arg(long)]
        purge: bool,
    },
}

/// Options for `status`.
#[derive(Args, Debug, Clone, Default)]
pub struct StatusOpts {
    /// Fetch from the remote before comparing
    #[arg(long)]
    pub fetch: bool,

    /// List uncommitted files
    #[arg(long)]
    pub files: bool,
}
