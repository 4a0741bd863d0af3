//! Tracing subscriber setup: console formatter, file layer, and initialisation.
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use super::utils::{strip_ansi, timestamped};
use super::{STAGE_TARGET, TRANSCRIPT_TARGET};

/// Extracts the `message` field from a [`tracing::Event`].
#[derive(Default)]
struct MessageExtractor {
    message: String,
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// A [`tracing_subscriber::Layer`] that appends all events to the
/// repository's `dotman.log`, one `[YYYY-MM-DD HH:MM:SS] ` prefixed entry per
/// event with ANSI codes stripped.
///
/// The file is opened in append mode and never truncated.
#[derive(Debug)]
pub struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Open (or create) `path` for appending.
    ///
    /// Returns `None` if the file cannot be opened.
    #[must_use]
    pub fn open(path: &Path) -> Option<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();

        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        let msg = strip_ansi(&extractor.message);

        let body = match (level, target) {
            (tracing::Level::INFO, STAGE_TARGET) => format!("==> {msg}"),
            (tracing::Level::ERROR, _) => format!("[error] {msg}"),
            (tracing::Level::WARN, _) => format!("[warn] {msg}"),
            (tracing::Level::DEBUG | tracing::Level::TRACE, _) => format!("[debug] {msg}"),
            _ => msg,
        };

        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{}", timestamped(&body)).ok();
        }
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] that emits dotman-style
/// console output.
struct DotmanFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for DotmanFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();

        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        let msg = &extractor.message;

        match level {
            tracing::Level::ERROR => writeln!(writer, "\x1b[31mERROR\x1b[0m {msg}"),
            tracing::Level::WARN => writeln!(writer, "\x1b[33mWARN\x1b[0m  {msg}"),
            tracing::Level::INFO if target == STAGE_TARGET => {
                writeln!(writer, "\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m")
            }
            tracing::Level::INFO if target == TRANSCRIPT_TARGET => {
                if msg.starts_with("Running:") {
                    writeln!(writer, "  \x1b[36m{msg}\x1b[0m")
                } else if msg.starts_with("Error:") {
                    writeln!(writer, "  \x1b[31m{msg}\x1b[0m")
                } else {
                    writeln!(writer, "  {}", msg.replace('\n', "\n    "))
                }
            }
            tracing::Level::INFO => writeln!(writer, "  {msg}"),
            _ => writeln!(writer, "  \x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// Sets up a console layer that formats events in the dotman output style
/// and, when `log_file` is given, a [`FileLayer`] that appends every event
/// (including `debug`) to it. With `console_to_stderr` all console output
/// goes to stderr so stdout stays free for machine-readable results.
///
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(verbose: bool, log_file: Option<&Path>, console_to_stderr: bool) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let console_layer = if console_to_stderr {
        fmt::layer()
            .event_format(DotmanFormatter)
            .with_writer(std::io::stderr.with_max_level(tracing::Level::TRACE))
            .with_filter(console_level)
            .boxed()
    } else {
        let make_writer = std::io::stderr
            .with_max_level(tracing::Level::WARN)
            .and(std::io::stdout.with_min_level(tracing::Level::INFO));
        fmt::layer()
            .event_format(DotmanFormatter)
            .with_writer(make_writer)
            .with_filter(console_level)
            .boxed()
    };

    let file_layer = log_file
        .and_then(FileLayer::open)
        .map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use tracing_subscriber::{Layer as _, filter::LevelFilter, layer::SubscriberExt as _};

    fn with_file_layer(path: &Path, f: impl FnOnce()) {
        let layer = FileLayer::open(path).expect("open log file");
        let subscriber = tracing_subscriber::registry().with(layer.with_filter(LevelFilter::DEBUG));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn file_layer_prefixes_every_event_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dotman.log");
        with_file_layer(&path, || {
            tracing::info!(target: TRANSCRIPT_TARGET, "Running: git fetch origin");
            tracing::error!("push rejected");
        });
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert!(line.starts_with('['), "missing timestamp: {line}");
            assert_eq!(&line[20..22], "] ", "bad prefix: {line}");
        }
        assert!(lines[0].ends_with("] Running: git fetch origin"));
        assert!(lines[1].ends_with("] [error] push rejected"));
    }

    #[test]
    fn file_layer_appends_and_strips_ansi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dotman.log");
        fs::write(&path, "earlier entry\n").unwrap();
        with_file_layer(&path, || {
            tracing::info!(target: STAGE_TARGET, "\x1b[1mApplying\x1b[0m");
        });
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("earlier entry\n"), "log must not be truncated");
        assert!(contents.contains("==> Applying"));
        assert!(!contents.contains('\x1b'));
    }

    #[test]
    fn file_layer_records_debug_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dotman.log");
        with_file_layer(&path, || {
            tracing::debug!("debug-marker");
        });
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[debug] debug-marker"));
    }
}
