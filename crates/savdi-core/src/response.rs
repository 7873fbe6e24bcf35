//! Scan result returned to callers.

use serde::Serialize;

use crate::error::ScanError;
use crate::protocol::{Verdict, decode_status};

/// Outcome of one scan.
///
/// `signature` is non-empty exactly when `infected` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// Path as given by the caller, converted lossily to UTF-8, or
    /// `"stream"` for stream submissions.
    pub filename: String,
    pub signature: String,
    pub infected: bool,
    /// The daemon's status line, verbatim.
    pub raw: String,
}

impl Response {
    /// Decode a status line into a response for `filename`.
    pub fn from_status_line(filename: impl Into<String>, line: String) -> Result<Self, ScanError> {
        let (infected, signature) = match decode_status(&line)? {
            Verdict::Clean => (false, String::new()),
            Verdict::Infected { signature } => (true, signature),
        };
        Ok(Self {
            filename: filename.into(),
            signature,
            infected,
            raw: line,
        })
    }

    pub fn is_clean(&self) -> bool {
        !self.infected
    }
}
