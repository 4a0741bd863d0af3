//! Append-only execution transcript and the structured outcome returned by
//! every orchestration operation.
use std::fmt;
use std::sync::Arc;

use crate::error::DotmanError;

/// Callback invoked with every transcript line as it is appended.
pub type TranscriptSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Ordered record of everything an operation ran and reported.
///
/// Lines are kept in memory and, when a sink is attached, forwarded to it
/// immediately so a front-end can stream progress.
#[derive(Default)]
pub struct Transcript {
    lines: Vec<String>,
    sink: Option<TranscriptSink>,
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcript")
            .field("lines", &self.lines)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Transcript {
    /// Create an empty transcript without a sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty transcript that forwards lines to `sink`.
    #[must_use]
    pub fn with_sink(sink: Option<TranscriptSink>) -> Self {
        Self {
            lines: Vec::new(),
            sink,
        }
    }

    /// Append a line.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        if let Some(sink) = &self.sink {
            sink(&line);
        }
        self.lines.push(line);
    }

    /// All lines recorded so far.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }

    /// Consume the transcript, returning its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// A result paired with the transcript gathered while producing it.
///
/// The transcript is always present, including on failure, so a failed
/// multi-step operation stays auditable.
#[derive(Debug)]
pub struct Outcome<T> {
    /// The operation's result.
    pub result: Result<T, DotmanError>,
    /// Transcript lines up to success or the point of failure.
    pub transcript: Vec<String>,
}

impl<T> Outcome<T> {
    /// Pair a result with a transcript.
    #[must_use]
    pub fn new(result: Result<T, DotmanError>, transcript: Transcript) -> Self {
        Self {
            result,
            transcript: transcript.into_lines(),
        }
    }

    /// Whether the operation succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Drop the transcript and return the result.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, if any.
    pub fn into_result(self) -> Result<T, DotmanError> {
        self.result
    }
}
