//! Resolution of XMLTV channel ids to catalog streams
//!
//! Providers differ in which identifier is trustworthy, so resolution is an
//! ordered list of strategies; the first one that names a stream wins and a
//! channel nobody claims keeps its XMLTV id.

use std::collections::{HashMap, HashSet};

use crate::models::{EpgChannelId, LiveStream};

/// One way of tying a guide channel to a stream id.
pub trait MatchStrategy: Send + Sync {
    fn resolve(&self, xmltv_id: &str, display_name: &str) -> Option<u32>;
}

/// The XMLTV id is the decimal stream id.
pub struct ExactIdMatch {
    ids: HashSet<u32>,
}

impl ExactIdMatch {
    pub fn new(streams: &[LiveStream]) -> Self {
        Self {
            ids: streams.iter().map(|s| s.id).filter(|id| *id > 0).collect(),
        }
    }
}

impl MatchStrategy for ExactIdMatch {
    fn resolve(&self, xmltv_id: &str, _display_name: &str) -> Option<u32> {
        let id = xmltv_id.parse::<u32>().ok().filter(|id| *id > 0)?;
        self.ids.contains(&id).then_some(id)
    }
}

/// The display name equals a stream name, ignoring case.
pub struct DisplayNameMatch {
    by_name: HashMap<String, u32>,
}

impl DisplayNameMatch {
    pub fn new(streams: &[LiveStream]) -> Self {
        let by_name = streams
            .iter()
            .filter(|s| s.id > 0 && !s.name.is_empty())
            .map(|s| (s.name.to_lowercase(), s.id))
            .collect();
        Self { by_name }
    }
}

impl MatchStrategy for DisplayNameMatch {
    fn resolve(&self, _xmltv_id: &str, display_name: &str) -> Option<u32> {
        if display_name.is_empty() {
            return None;
        }
        self.by_name.get(&display_name.to_lowercase()).copied()
    }
}

pub struct ChannelMatcher {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl ChannelMatcher {
    pub fn new(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Exact id first, then case-insensitive display name.
    pub fn for_streams(streams: &[LiveStream]) -> Self {
        Self::new(vec![
            Box::new(ExactIdMatch::new(streams)),
            Box::new(DisplayNameMatch::new(streams)),
        ])
    }

    pub fn resolve(&self, xmltv_id: &str, display_name: &str) -> EpgChannelId {
        self.strategies
            .iter()
            .find_map(|s| s.resolve(xmltv_id, display_name))
            .map_or_else(|| EpgChannelId::Xmltv(xmltv_id.to_string()), EpgChannelId::Stream)
    }
}
