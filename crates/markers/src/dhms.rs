//! `days:hours:minutes:seconds` text conversions.

use crate::error::{MarkerError, Result};

const WEIGHTS: [f64; 4] = [86_400.0, 3_600.0, 60.0, 1.0];
const SHARE_UNITS: [char; 3] = ['m', 'h', 'd'];

/// Formats whole seconds as zero-padded DHMS text.
///
/// Leading all-zero components are dropped while more than `min_places`
/// components remain. `min_places` is clamped to `1..=4`.
///
/// # Example
/// ```
/// use markers::dhms::seconds_to_dhms;
///
/// assert_eq!(seconds_to_dhms(65.0, 2), "01:05");
/// assert_eq!(seconds_to_dhms(3_725.0, 2), "01:02:05");
/// assert_eq!(seconds_to_dhms(5.0, 1), "05");
/// ```
pub fn seconds_to_dhms(seconds: f64, min_places: usize) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let parts = [
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    ];

    let min_places = min_places.clamp(1, parts.len());
    let skip = parts[..parts.len() - min_places]
        .iter()
        .take_while(|part| **part == 0)
        .count();

    parts[skip..]
        .iter()
        .map(|part| format!("{part:02}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Like [`seconds_to_dhms`], but the seconds component keeps its fraction so
/// the text parses back to exactly `seconds`.
///
/// # Example
/// ```
/// use markers::dhms::{parse_dhms, seconds_to_dhms_precise};
///
/// assert_eq!(seconds_to_dhms_precise(65.5, 2), "01:05.5");
/// assert_eq!(seconds_to_dhms_precise(65.0, 2), "01:05");
/// assert_eq!(parse_dhms(&seconds_to_dhms_precise(100.3, 2)).expect("valid"), 100.3);
/// ```
pub fn seconds_to_dhms_precise(seconds: f64, min_places: usize) -> String {
    let whole = seconds_to_dhms(seconds, min_places);
    if !seconds.is_finite() || seconds <= 0.0 || seconds.fract() == 0.0 {
        return whole;
    }

    // Both operands are multiples of the ulp of `seconds`, so this is exact.
    let floored = seconds.floor();
    let rest = seconds - (floored - floored % 60.0);
    let last = if rest < 10.0 {
        format!("0{rest}")
    } else {
        rest.to_string()
    };
    match whole.rsplit_once(':') {
        Some((head, _)) => format!("{head}:{last}"),
        None => last,
    }
}

/// Sums DHMS components, the last one being seconds.
///
/// Returns `None` for an empty slice or more than four components.
pub fn dhms_to_seconds(parts: &[f64]) -> Option<f64> {
    if parts.is_empty() || parts.len() > WEIGHTS.len() {
        return None;
    }

    let weights = &WEIGHTS[WEIGHTS.len() - parts.len()..];
    Some(parts.iter().zip(weights).map(|(part, weight)| part * weight).sum())
}

/// Parses DHMS text such as `1:02:05` or `125` into seconds.
///
/// # Example
/// ```
/// use markers::dhms::parse_dhms;
///
/// assert_eq!(parse_dhms("01:02:05").expect("valid"), 3_725.0);
/// assert!(parse_dhms("1:x").is_err());
/// ```
pub fn parse_dhms(text: &str) -> Result<f64> {
    let invalid = || MarkerError::InvalidTime {
        value: text.to_string(),
    };

    let parts = text
        .trim()
        .split(':')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value >= 0.0)
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(invalid)?;

    dhms_to_seconds(&parts).ok_or_else(invalid)
}

/// Number of components the DHMS text of `seconds` uses.
pub fn dhms_places(seconds: f64, min_places: usize) -> usize {
    seconds_to_dhms(seconds, min_places).split(':').count()
}

/// Formats seconds as a player `t=` timestamp, e.g. `01h02m05s`.
///
/// # Example
/// ```
/// use markers::dhms::share_timestamp;
///
/// assert_eq!(share_timestamp(3_725.0), "01h02m05s");
/// assert_eq!(share_timestamp(42.0), "42s");
/// ```
pub fn share_timestamp(seconds: f64) -> String {
    let dhms = seconds_to_dhms(seconds, 1);
    let parts: Vec<&str> = dhms.split(':').collect();

    let mut out = String::with_capacity(dhms.len() + 1);
    for (index, part) in parts.iter().enumerate() {
        out.push_str(part);
        if index + 1 < parts.len() {
            out.push(SHARE_UNITS[parts.len() - 2 - index]);
        }
    }
    out.push('s');
    out
}

/// Builds a link that opens `video_id` at `seconds`.
pub fn share_link(base_url: &str, video_id: &str, seconds: f64) -> String {
    format!("{base_url}{video_id}?t={}", share_timestamp(seconds))
}
