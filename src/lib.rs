//! Profile-based dotfiles manager.
//!
//! A repository holds named **profiles**, each made of **packages** whose
//! trees mirror the home directory. Packages are linked into place with GNU
//! stow; real files that would be overwritten are moved into `backups/`
//! first. A separate `storage/` area keeps arbitrary files in the repository
//! behind symlinks. The repository is kept in step with its remote by a
//! git-driven sync state machine.
//!
//! The public API is organised into layers:
//!
//! - **[`exec`]**, **[`git`]**, **[`stow`]**: external programs, with
//!   timeouts, cancellation and transcripts
//! - **[`conflicts`]**, **[`backup`]**, **[`link`]**: linking with conflict
//!   recovery, import and restore
//! - **[`sync`]**: fetch / check / pull / push state machine
//! - **[`layout`]**, **[`storage`]**: repository bookkeeping
//! - **[`engine`]**: the serialized handle every command goes through
//! - **[`commands`]**: CLI subcommand handlers
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod backup;
pub mod cli;
#[allow(clippy::print_stdout)]
pub mod commands;
pub mod config;
pub mod conflicts;
pub mod engine;
pub mod error;
pub mod exec;
pub mod git;
pub mod helpers;
pub mod layout;
pub mod link;
pub mod logging;
pub mod storage;
pub mod stow;
pub mod sync;
pub mod transcript;
