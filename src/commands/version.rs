//! Command: print version information.

/// Print the dotman version to stdout.
pub fn run() {
    let version = option_env!("DOTMAN_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    println!("dotman {version}");
}
