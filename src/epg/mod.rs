//! EPG (Electronic Program Guide) module
//!
//! Contains the XMLTV parser, input repair and channel matching.

mod matcher;
mod parser;
mod sanitize;

pub use matcher::{ChannelMatcher, DisplayNameMatch, ExactIdMatch, MatchStrategy};
pub use parser::{parse_xmltv, parse_xmltv_time, parse_xmltv_with};
pub use sanitize::{inflate_if_gzip, is_gzip, sanitize};

use crate::config::EpgSettings;

/// Largest manual guide shift accepted from settings, either direction.
pub const MAX_TIME_SHIFT_HOURS: f64 = 48.0;

/// What to do with the `+HHMM` suffix of XMLTV timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetHandling {
    #[default]
    Apply,
    /// Read the clock fields as UTC
    Ignore,
}

/// Time handling for guide parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpgOptions {
    pub offset_handling: OffsetHandling,
    /// Added to every parsed timestamp
    pub time_shift_secs: i64,
}

impl EpgOptions {
    pub fn from_settings(settings: &EpgSettings) -> Self {
        Self {
            offset_handling: if settings.apply_timezone_offset {
                OffsetHandling::Apply
            } else {
                OffsetHandling::Ignore
            },
            time_shift_secs: (f64::from(settings.time_offset_hours)
                .clamp(-MAX_TIME_SHIFT_HOURS, MAX_TIME_SHIFT_HOURS)
                * 3600.0)
                .round() as i64,
        }
    }
}

/// Quick check that a response body is a guide rather than an error page.
pub fn looks_like_xmltv(body: &[u8]) -> bool {
    if is_gzip(body) {
        return true;
    }
    let head = &body[..body.len().min(4096)];
    let text = String::from_utf8_lossy(head);
    text.contains("<?xml") || text.contains("<tv")
}

/// Format a Unix timestamp as local time HH:MM
pub fn format_time(ts: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => ts.to_string(),
    }
}

/// Format a Unix timestamp as local datetime YYYY-MM-DD HH:MM
pub fn format_datetime(ts: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}
