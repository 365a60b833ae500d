//! Log line classifier.
//!
//! The coordinator's runner emits text markers anywhere in a line:
//! `[START]` when the job begins, `[SUCCESS]`/`[ERROR]` when it ends, and
//! `[STATUS]` with a percentage (`... 84.3%`) while it renders. The
//! classifier is pure and transport-agnostic so it can be tested against
//! literal line fixtures.

/// Marker emitted when the job starts.
pub const START_MARKER: &str = "[START]";
/// Marker emitted when the job exits cleanly.
pub const SUCCESS_MARKER: &str = "[SUCCESS]";
/// Marker emitted when the job exits with an error.
pub const ERROR_MARKER: &str = "[ERROR]";
/// Marker emitted on progress lines.
pub const STATUS_MARKER: &str = "[STATUS]";

/// A classified log line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineEvent {
    TaskStart,
    Success,
    Error,
    /// Progress percentage (0.0–100.0 by convention, not enforced).
    Progress(f64),
    /// Anything without a recognized marker.
    Other,
}

/// Classify one log line.
///
/// Terminal markers win over the start marker; a status line with an
/// unparsable percentage degrades to `Other`.
pub fn classify(line: &str) -> LineEvent {
    if line.contains(SUCCESS_MARKER) {
        LineEvent::Success
    } else if line.contains(ERROR_MARKER) {
        LineEvent::Error
    } else if line.contains(START_MARKER) {
        LineEvent::TaskStart
    } else if line.contains(STATUS_MARKER) && line.contains('%') {
        match parse_percent(line) {
            Some(percent) => LineEvent::Progress(percent),
            None => LineEvent::Other,
        }
    } else {
        LineEvent::Other
    }
}

/// The number immediately preceding the first `%` in the line.
fn parse_percent(line: &str) -> Option<f64> {
    line.split('%')
        .next()?
        .split_whitespace()
        .last()?
        .parse()
        .ok()
}
