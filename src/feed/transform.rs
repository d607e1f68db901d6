//! Pure field derivation for a single feature entry.
//!
//! Nothing here performs I/O or keeps state; every function maps raw feed
//! values to the strings carried by [`FeedRecord`](super::FeedRecord).

use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Offset shown when a location has no `" of "` clause.
pub const NEAR_BY: &str = "Near by";

const DATE_FORMAT: &str = "%b %d, %Y";
const TIME_FORMAT: &str = "%-I:%M %p";

// ============================================================================
// Magnitude
// ============================================================================

/// Formats a magnitude with exactly one decimal digit.
///
/// Rounds half away from zero on the shortest decimal representation of the
/// value, so `2.25` becomes `"2.3"` and `-1.25` becomes `"-1.3"` regardless of
/// how the value is stored in binary. Values that round to zero carry no sign.
///
/// ```
/// use quakefeed::feed::format_magnitude;
///
/// assert_eq!(format_magnitude(6.07), "6.1");
/// assert_eq!(format_magnitude(4.0), "4.0");
/// assert_eq!(format_magnitude(0.95), "1.0");
/// ```
pub fn format_magnitude(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    // f64's Display never switches to exponent notation
    let digits = value.abs().to_string();
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits.as_str(), ""));
    let mut frac = frac_part.bytes();
    let tenths = frac.next().unwrap_or(b'0');
    let round_up = frac.next().is_some_and(|b| b >= b'5');

    // Integer digits followed by the tenths digit, i.e. the value scaled by 10
    let mut scaled: Vec<u8> = int_part.bytes().chain(std::iter::once(tenths)).collect();
    if round_up && increment_digits(&mut scaled) {
        scaled.insert(0, b'1');
    }

    let is_zero = scaled.iter().all(|&d| d == b'0');
    let (whole, last) = scaled.split_at(scaled.len() - 1);

    let mut out = String::with_capacity(scaled.len() + 2);
    if value < 0.0 && !is_zero {
        out.push('-');
    }
    out.extend(whole.iter().map(|&d| char::from(d)));
    out.push('.');
    out.push(char::from(last[0]));
    out
}

/// Adds one to an ASCII digit string in place. Returns true on overflow.
fn increment_digits(digits: &mut [u8]) -> bool {
    for d in digits.iter_mut().rev() {
        if *d == b'9' {
            *d = b'0';
        } else {
            *d += 1;
            return false;
        }
    }
    true
}

// ============================================================================
// Location
// ============================================================================

/// A location description split into its offset and primary parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationParts<'a> {
    pub offset: &'a str,
    pub primary: &'a str,
}

/// Splits a location description at its last `" of "` token.
///
/// The offset runs up to and including `of`; the primary location starts
/// after the single space that follows it. Without a token the offset is
/// [`NEAR_BY`] and the primary location is the input unchanged.
///
/// ```
/// use quakefeed::feed::split_location;
///
/// let parts = split_location("10km NW of A, 20km SE of B");
/// assert_eq!(parts.offset, "20km SE of");
/// assert_eq!(parts.primary, "B");
/// ```
pub fn split_location(raw: &str) -> LocationParts<'_> {
    // Rightmost match wins: "5km ENE of X, 10km SW of Y" splits before Y
    match raw.rfind(" of ") {
        Some(space) => LocationParts {
            offset: &raw[..space + 3],
            primary: &raw[space + 4..],
        },
        None => LocationParts {
            offset: NEAR_BY,
            primary: raw,
        },
    }
}

// ============================================================================
// Date and time
// ============================================================================

/// Time zone used to render timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum TimeZonePolicy {
    #[default]
    Utc,
    /// The host's local zone at the time of formatting
    Local,
    Fixed(FixedOffset),
}

impl FromStr for TimeZonePolicy {
    type Err = String;

    /// Accepts `utc`, `local`, or an offset such as `+05:30`, `-08`, `+0930`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "utc" | "z" => return Ok(TimeZonePolicy::Utc),
            "local" => return Ok(TimeZonePolicy::Local),
            _ => {}
        }
        parse_offset(trimmed)
            .map(TimeZonePolicy::Fixed)
            .ok_or_else(|| format!("unrecognized timezone `{s}` (expected utc, local or ±HH:MM)"))
    }
}

impl TryFrom<String> for TimeZonePolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for TimeZonePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZonePolicy::Utc => f.write_str("utc"),
            TimeZonePolicy::Local => f.write_str("local"),
            TimeZonePolicy::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    if !rest.is_ascii() {
        return None;
    }
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    if hours.is_empty() || !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Renders a millisecond epoch timestamp as `MMM dd, yyyy` (e.g. `Jan 05, 2024`).
///
/// Returns `None` when the timestamp is outside the representable range.
pub fn format_date(epoch_millis: i64, tz: TimeZonePolicy) -> Option<String> {
    render_timestamp(epoch_millis, tz, DATE_FORMAT)
}

/// Renders a millisecond epoch timestamp as `h:mm a` (e.g. `3:07 PM`).
///
/// Returns `None` when the timestamp is outside the representable range.
pub fn format_time(epoch_millis: i64, tz: TimeZonePolicy) -> Option<String> {
    render_timestamp(epoch_millis, tz, TIME_FORMAT)
}

fn render_timestamp(epoch_millis: i64, tz: TimeZonePolicy, pattern: &str) -> Option<String> {
    let utc: DateTime<Utc> = DateTime::from_timestamp_millis(epoch_millis)?;
    let rendered = match tz {
        TimeZonePolicy::Utc => utc.format(pattern).to_string(),
        TimeZonePolicy::Local => utc.with_timezone(&Local).format(pattern).to_string(),
        TimeZonePolicy::Fixed(offset) => utc.with_timezone(&offset).format(pattern).to_string(),
    };
    Some(rendered)
}
