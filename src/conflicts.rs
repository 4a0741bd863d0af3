//! Extraction of conflicting paths from link-tool output.
//!
//! Stow reports a refused link with one line per collision, e.g.
//!
//! ```text
//! WARNING! stowing bash would cause conflicts:
//!   * existing target is neither a link nor a directory: .bashrc
//!   * existing target is not owned by stow: .config/hypr/hyprland.conf
//! All operations aborted.
//! ```
//!
//! The marker phrases live in a [`ConflictPatterns`] table so new tool
//! versions can be supported without touching the link engine.

/// A phrase that introduces a conflicting path on a line of tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictMarker {
    /// Literal text preceding the path.
    pub marker: String,
    /// Literal text ending the path; the rest of the line when `None`.
    pub terminator: Option<String>,
}

impl ConflictMarker {
    /// A marker whose path runs to the end of the line.
    #[must_use]
    pub fn to_end_of_line(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
            terminator: None,
        }
    }

    /// A marker whose path ends at `terminator`.
    #[must_use]
    pub fn delimited(marker: &str, terminator: &str) -> Self {
        Self {
            marker: marker.to_string(),
            terminator: Some(terminator.to_string()),
        }
    }

    fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        let idx = line.find(&self.marker)?;
        let rest = line.get(idx + self.marker.len()..)?;
        let path = match &self.terminator {
            Some(end) => rest.find(end.as_str()).and_then(|e| rest.get(..e))?,
            None => rest,
        };
        let path = path.trim();
        (!path.is_empty()).then_some(path)
    }
}

/// Marker and suspicion phrases recognised in link-tool output.
#[derive(Debug, Clone)]
pub struct ConflictPatterns {
    markers: Vec<ConflictMarker>,
    suspicion: Vec<String>,
}

impl Default for ConflictPatterns {
    fn default() -> Self {
        Self {
            markers: vec![
                ConflictMarker::to_end_of_line(
                    "existing target is neither a link nor a directory:",
                ),
                ConflictMarker::to_end_of_line("existing target is not owned by stow:"),
                // stow >= 2.4: "cannot stow X over existing target Y since neither a link nor a directory"
                ConflictMarker::delimited("over existing target ", " since"),
            ],
            suspicion: vec!["conflicts".to_string(), "existing target".to_string()],
        }
    }
}

impl ConflictPatterns {
    /// A table with no entries.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            markers: Vec::new(),
            suspicion: Vec::new(),
        }
    }

    /// Add a marker to the table.
    #[must_use]
    pub fn with_marker(mut self, marker: ConflictMarker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Add a suspicion phrase to the table.
    #[must_use]
    pub fn with_suspicion(mut self, phrase: &str) -> Self {
        self.suspicion.push(phrase.to_string());
        self
    }

    /// Extract the conflicting paths from `output`, one per matching line, in
    /// order and with duplicates kept.
    ///
    /// The first marker that matches a line wins.
    #[must_use]
    pub fn parse(&self, output: &str) -> Vec<String> {
        output
            .lines()
            .filter_map(|line| self.markers.iter().find_map(|m| m.extract(line)))
            .map(str::to_string)
            .collect()
    }

    /// Whether `output` reads like a conflict report, whether or not any path
    /// could be extracted from it.
    #[must_use]
    pub fn looks_like_conflict(&self, output: &str) -> bool {
        self.suspicion.iter().any(|p| output.contains(p.as_str()))
            || self.markers.iter().any(|m| output.contains(m.marker.as_str()))
    }
}

/// Parse with the default pattern table.
#[must_use]
pub fn parse_conflicts(output: &str) -> Vec<String> {
    ConflictPatterns::default().parse(output)
}
