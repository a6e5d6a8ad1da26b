//! Typed records handed to the playback host

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Live TV category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveCategory {
    pub id: u32,
    pub name: String,
}

/// Live channel/stream information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStream {
    pub id: u32,
    /// 0 when the provider did not assign one
    pub category_id: u32,
    /// Channel number as listed by the provider (0 if absent)
    pub number: u32,
    pub name: String,
    pub icon: String,
}

/// Categories and streams from one orchestrated catalog fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveCatalog {
    pub categories: Vec<LiveCategory>,
    pub streams: Vec<LiveStream>,
}

/// Container used when building playable URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// MPEG transport stream (`.ts`)
    #[default]
    Ts,
    /// HTTP live streaming (`.m3u8`)
    Hls,
}

impl StreamFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            StreamFormat::Ts => ".ts",
            StreamFormat::Hls => ".m3u8",
        }
    }

    /// "hls" (any case) selects HLS, anything else is TS.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("hls") {
            StreamFormat::Hls
        } else {
            StreamFormat::Ts
        }
    }
}

/// Key of a guide channel.
///
/// Matched XMLTV channels are keyed by the stream they resolved to; the rest
/// keep the identifier the guide declared for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EpgChannelId {
    Stream(u32),
    Xmltv(String),
}

impl EpgChannelId {
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            EpgChannelId::Stream(id) => Some(*id),
            EpgChannelId::Xmltv(_) => None,
        }
    }
}

impl fmt::Display for EpgChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpgChannelId::Stream(id) => write!(f, "{}", id),
            EpgChannelId::Xmltv(id) => f.write_str(id),
        }
    }
}

/// A single guide programme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpgEntry {
    pub channel_id: EpgChannelId,
    /// Unix timestamps, `end_time > start_time`
    pub start_time: i64,
    pub end_time: i64,
    pub title: String,
    pub description: String,
    /// From `<sub-title>`
    pub episode_name: String,
    /// e.g. "S01E05", from `<episode-num system="xmltv_ns">`
    pub episode_number: Option<String>,
    pub icon_path: String,
    pub genre_string: String,
}

/// Guide data for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEpg {
    pub id: EpgChannelId,
    pub display_name: String,
    pub icon_path: String,
    /// Keyed by start time
    pub entries: BTreeMap<i64, EpgEntry>,
}

impl ChannelEpg {
    /// Programme airing at `ts`
    pub fn entry_at(&self, ts: i64) -> Option<&EpgEntry> {
        self.entries
            .range(..=ts)
            .next_back()
            .map(|(_, e)| e)
            .filter(|e| e.end_time > ts)
    }

    /// Programmes overlapping `[start, end)`
    pub fn entries_in_range(&self, start: i64, end: i64) -> impl Iterator<Item = &EpgEntry> {
        self.entries
            .values()
            .filter(move |e| e.end_time > start && e.start_time < end)
    }
}

/// Season-pass rule keyed by an external programme id
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeriesRule {
    pub tvg_id: String,
    pub title: String,
    /// Passed through as the server reports it ("all", "new", ...)
    pub mode: String,
}

/// Weekly timer bound to one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringRule {
    pub id: u32,
    pub channel_id: u32,
    /// 0-6
    pub days_of_week: BTreeSet<u8>,
    /// HH:MM:SS
    pub start_time: String,
    pub end_time: String,
    /// YYYY-MM-DD
    pub start_date: String,
    pub end_date: String,
    pub name: String,
    pub enabled: bool,
}

impl Default for RecurringRule {
    fn default() -> Self {
        Self {
            id: 0,
            channel_id: 0,
            days_of_week: BTreeSet::new(),
            start_time: String::new(),
            end_time: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            name: String::new(),
            enabled: true,
        }
    }
}

/// Recording job known to the DVR
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Recording {
    pub id: u32,
    pub channel_id: u32,
    pub title: String,
    pub plot: String,
    pub stream_url: String,
    /// Unix timestamps; 0 when the server value was not understood
    pub start_time: i64,
    pub end_time: i64,
}
