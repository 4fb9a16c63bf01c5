//! Observed value parser
//!
//! The consumer echoes the mounted file once per poll. A readable line holds
//! integer seconds since the epoch; anything else (notably the empty or
//! placeholder content seen before the first write lands) is a parse error.

use crate::error::ParseError;
use crate::types::Timestamp;
use chrono::DateTime;

/// Parse one raw observation line into the timestamp it encodes
///
/// Surrounding whitespace is ignored.
///
/// # Errors
/// - `ParseError::Empty` for blank lines
/// - `ParseError::NotAnInteger` for non-numeric content
/// - `ParseError::OutOfRange` for integers chrono cannot represent
pub fn parse_observation(line: &str) -> Result<Timestamp, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let secs: i64 = trimmed.parse().map_err(|source| ParseError::NotAnInteger {
        line: trimmed.to_string(),
        source,
    })?;

    DateTime::from_timestamp(secs, 0).ok_or(ParseError::OutOfRange { secs })
}
