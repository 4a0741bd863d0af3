//! Helpers for the log file: escape stripping and timestamps.

/// Remove terminal escape sequences from `s`.
///
/// CSI sequences (`ESC [ … final`) are dropped up to and including their
/// final byte in `@`..=`~`. Any other escape drops the `ESC` and the single
/// character after it.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(esc) = rest.find('\x1b') {
        out.push_str(rest.get(..esc).unwrap_or_default());
        let mut tail = rest.get(esc + 1..).unwrap_or_default().chars();
        if tail.next() == Some('[') {
            let _ = tail.find(|c| ('@'..='~').contains(c));
        }
        rest = tail.as_str();
    }
    out.push_str(rest);
    out
}

/// Prefix `msg` with the local time as `[YYYY-MM-DD HH:MM:SS] `.
pub(super) fn timestamped(msg: &str) -> String {
    format!("[{}] {msg}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
}
