//! Duration strings used by culling policies
//!
//! Go `time.ParseDuration` syntax: an optional sign followed by one or more
//! `<decimal><unit>` terms, e.g. `"2s"`, `"0.5s"`, `"1h1m"`, `"1440m"`. Valid
//! units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.

use crate::error::CrdError;
use std::time::Duration;

/// Parse a policy duration string.
///
/// # Errors
///
/// Returns [`CrdError::InvalidDuration`] for strings outside the grammar or
/// durations too large to represent, and [`CrdError::NegativeDuration`] for
/// negative values.
pub fn parse_duration(input: &str) -> Result<Duration, CrdError> {
    let nanos = go_parse_duration::parse_duration(input)
        .map_err(|_err| CrdError::InvalidDuration(input.to_string()))?;
    if nanos < 0 {
        return Err(CrdError::NegativeDuration(input.to_string()));
    }
    let nanos = u64::try_from(nanos).map_err(|_err| CrdError::InvalidDuration(input.to_string()))?;
    Ok(Duration::from_nanos(nanos))
}
