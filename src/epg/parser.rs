//! XMLTV parser
//!
//! Two passes over the buffered document: the first collects `<channel>`
//! elements and resolves them to catalog streams, the second attaches
//! `<programme>` elements to the channels found by the first.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::{debug, info, warn};

use super::matcher::ChannelMatcher;
use super::sanitize::{inflate_if_gzip, sanitize};
use super::{EpgOptions, OffsetHandling};
use crate::error::FetchError;
use crate::models::{ChannelEpg, EpgChannelId, EpgEntry, LiveStream};

/// Individual XML errors reported in the log before only counting.
const MAX_LOGGED_ERRORS: usize = 20;

/// Parses an XMLTV document and joins it against `streams`.
///
/// Channels left without any programme are dropped; when none remain the
/// result is [`FetchError::EmptyResult`].
pub fn parse_xmltv(
    xml: &[u8],
    streams: &[LiveStream],
    options: &EpgOptions,
) -> Result<Vec<ChannelEpg>, FetchError> {
    parse_xmltv_with(xml, &ChannelMatcher::for_streams(streams), options)
}

/// [`parse_xmltv`] with a caller-supplied channel matcher.
pub fn parse_xmltv_with(
    xml: &[u8],
    matcher: &ChannelMatcher,
    options: &EpgOptions,
) -> Result<Vec<ChannelEpg>, FetchError> {
    if xml.is_empty() {
        return Err(FetchError::EmptyResult("XMLTV data is empty".to_string()));
    }
    let inflated = inflate_if_gzip(xml)?;
    let xml = sanitize(&inflated);

    let mut channels: BTreeMap<EpgChannelId, ChannelEpg> = BTreeMap::new();
    // declared XMLTV id -> resolved key
    let mut aliases: HashMap<String, EpgChannelId> = HashMap::new();

    let stats = walk(&xml, Pass::Channels, |item| {
        if let Item::Channel(c) = item {
            let key = matcher.resolve(&c.id, &c.display_name);
            aliases.insert(c.id, key.clone());
            channels.insert(
                key.clone(),
                ChannelEpg {
                    id: key,
                    display_name: c.display_name,
                    icon_path: c.icon,
                    entries: BTreeMap::new(),
                },
            );
        }
    })?;
    if stats.errors > 0 {
        warn!(errors = stats.errors, "Recovered from XMLTV syntax errors");
    }
    debug!(channels = channels.len(), "Collected XMLTV channels");

    let mut programme_count = 0usize;
    let mut dropped = 0usize;
    walk(&xml, Pass::Programmes, |item| {
        let Item::Programme(p) = item else {
            return;
        };
        let Some(key) = aliases.get(&p.channel) else {
            dropped += 1;
            return;
        };
        let Some(channel) = channels.get_mut(key) else {
            return;
        };

        let start = parse_xmltv_time(&p.start, options);
        let stop = parse_xmltv_time(&p.stop, options);
        let (start, stop) = match (start, stop) {
            (Some(start), Some(stop)) if stop > start => (start, stop),
            _ => {
                dropped += 1;
                return;
            }
        };

        channel.entries.insert(
            start,
            EpgEntry {
                channel_id: key.clone(),
                start_time: start,
                end_time: stop,
                title: p.title,
                description: p.description,
                episode_name: p.sub_title,
                episode_number: p.episode_number,
                icon_path: p.icon,
                genre_string: p.category,
            },
        );
        programme_count += 1;
    })?;

    let result: Vec<ChannelEpg> = channels
        .into_values()
        .filter(|c| !c.entries.is_empty())
        .collect();

    info!(
        channels = result.len(),
        programmes = programme_count,
        dropped,
        "Parsed XMLTV"
    );

    if result.is_empty() {
        return Err(FetchError::EmptyResult(
            "XMLTV contained no programmes for any channel".to_string(),
        ));
    }
    Ok(result)
}

/// Parses `YYYYMMDDHHMMSS [+-]HHMM` into a Unix timestamp.
///
/// The offset is applied on a best-effort basis: a malformed offset is
/// ignored and the clock fields are read as UTC.
pub fn parse_xmltv_time(value: &str, options: &EpgOptions) -> Option<i64> {
    let value = value.trim();
    let clock = value.get(..14)?;
    let naive = NaiveDateTime::parse_from_str(clock, "%Y%m%d%H%M%S").ok()?;
    let mut ts = naive.and_utc().timestamp();

    if options.offset_handling == OffsetHandling::Apply {
        ts -= parse_tz_offset(&value[14..]).unwrap_or(0);
    }
    ts.checked_add(options.time_shift_secs)
}

/// "+0100" / "-0530" / "+01" to seconds east of UTC.
fn parse_tz_offset(tz: &str) -> Option<i64> {
    let tz = tz.trim();
    let (sign, digits) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => (1, tz),
    };

    let hours: i64 = digits.get(0..2)?.parse().ok()?;
    let minutes: i64 = match digits.get(2..4) {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

/// "0.4." (zero-based `xmltv_ns`) to "S01E05".
fn format_episode(episode: &str) -> Option<String> {
    let mut parts = episode.trim().split('.');
    let season = parts.next()?.split('/').next()?.trim().parse::<u32>().ok()?;
    let ep = parts.next()?.split('/').next()?.trim().parse::<u32>().ok()?;
    Some(format!("S{:02}E{:02}", season + 1, ep + 1))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pass {
    Channels,
    Programmes,
}

#[derive(Debug, Default)]
struct RawChannel {
    id: String,
    display_name: String,
    icon: String,
}

#[derive(Debug, Default)]
struct RawProgramme {
    channel: String,
    start: String,
    stop: String,
    title: String,
    description: String,
    sub_title: String,
    category: String,
    icon: String,
    episode_number: Option<String>,
}

enum Item {
    Channel(RawChannel),
    Programme(RawProgramme),
}

#[derive(Debug, Default)]
struct WalkStats {
    errors: usize,
}

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Channel,
    DisplayName,
    Programme,
    Title,
    Desc,
    SubTitle,
    Category,
    EpisodeNum,
}

/// Element walk shared by both passes; elements not wanted by `pass` are
/// skipped without collecting their text.
struct Walker {
    pass: Pass,
    state: ParserState,
    channel: Option<RawChannel>,
    programme: Option<RawProgramme>,
    text: String,
    episode_ns: bool,
    saw_root: bool,
}

impl Walker {
    fn new(pass: Pass) -> Self {
        Self {
            pass,
            state: ParserState::Root,
            channel: None,
            programme: None,
            text: String::new(),
            episode_ns: false,
            saw_root: false,
        }
    }

    fn start(&mut self, e: &BytesStart<'_>) {
        let name = e.name();
        match name.as_ref() {
            b"tv" => self.saw_root = true,
            b"channel" if self.pass == Pass::Channels => {
                self.state = ParserState::Channel;
                self.channel = Some(RawChannel {
                    id: get_attribute(e, b"id").unwrap_or_default().trim().to_string(),
                    ..RawChannel::default()
                });
            }
            b"programme" if self.pass == Pass::Programmes => {
                self.state = ParserState::Programme;
                self.programme = Some(RawProgramme {
                    channel: get_attribute(e, b"channel").unwrap_or_default().trim().to_string(),
                    start: get_attribute(e, b"start").unwrap_or_default(),
                    stop: get_attribute(e, b"stop").unwrap_or_default(),
                    ..RawProgramme::default()
                });
            }
            b"display-name" if self.state == ParserState::Channel => {
                self.state = ParserState::DisplayName;
                self.text.clear();
            }
            b"title" if self.state == ParserState::Programme => {
                self.state = ParserState::Title;
                self.text.clear();
            }
            b"desc" if self.state == ParserState::Programme => {
                self.state = ParserState::Desc;
                self.text.clear();
            }
            b"sub-title" if self.state == ParserState::Programme => {
                self.state = ParserState::SubTitle;
                self.text.clear();
            }
            b"category" if self.state == ParserState::Programme => {
                self.state = ParserState::Category;
                self.text.clear();
            }
            b"episode-num" if self.state == ParserState::Programme => {
                self.state = ParserState::EpisodeNum;
                self.episode_ns = get_attribute(e, b"system").as_deref() == Some("xmltv_ns");
                self.text.clear();
            }
            b"icon" => {
                let Some(src) = get_attribute(e, b"src").filter(|s| !s.is_empty()) else {
                    return;
                };
                match self.state {
                    ParserState::Channel => {
                        if let Some(ref mut chan) = self.channel {
                            if chan.icon.is_empty() {
                                chan.icon = src;
                            }
                        }
                    }
                    ParserState::Programme => {
                        if let Some(ref mut prog) = self.programme {
                            if prog.icon.is_empty() {
                                prog.icon = src;
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if matches!(
            self.state,
            ParserState::DisplayName
                | ParserState::Title
                | ParserState::Desc
                | ParserState::SubTitle
                | ParserState::Category
                | ParserState::EpisodeNum
        ) {
            self.text.push_str(text);
        }
    }

    fn end(&mut self, name: &[u8], on_item: &mut impl FnMut(Item)) {
        let text = self.text.trim();
        match (name, self.state) {
            (b"channel", _) => {
                if let Some(channel) = self.channel.take() {
                    if !channel.id.is_empty() {
                        on_item(Item::Channel(channel));
                    }
                }
                self.state = ParserState::Root;
            }
            (b"programme", _) => {
                if let Some(programme) = self.programme.take() {
                    if !programme.channel.is_empty() {
                        on_item(Item::Programme(programme));
                    }
                }
                self.state = ParserState::Root;
            }
            (b"display-name", ParserState::DisplayName) => {
                if let Some(ref mut chan) = self.channel {
                    if chan.display_name.is_empty() {
                        chan.display_name = text.to_string();
                    }
                }
                self.state = ParserState::Channel;
            }
            (b"title", ParserState::Title) => {
                if let Some(ref mut prog) = self.programme {
                    if prog.title.is_empty() {
                        prog.title = text.to_string();
                    }
                }
                self.state = ParserState::Programme;
            }
            (b"desc", ParserState::Desc) => {
                if let Some(ref mut prog) = self.programme {
                    if prog.description.is_empty() {
                        prog.description = text.to_string();
                    }
                }
                self.state = ParserState::Programme;
            }
            (b"sub-title", ParserState::SubTitle) => {
                if let Some(ref mut prog) = self.programme {
                    if prog.sub_title.is_empty() {
                        prog.sub_title = text.to_string();
                    }
                }
                self.state = ParserState::Programme;
            }
            (b"category", ParserState::Category) => {
                if let Some(ref mut prog) = self.programme {
                    if prog.category.is_empty() {
                        prog.category = text.to_string();
                    }
                }
                self.state = ParserState::Programme;
            }
            (b"episode-num", ParserState::EpisodeNum) => {
                if let Some(ref mut prog) = self.programme {
                    if self.episode_ns {
                        if let Some(ep) = format_episode(text) {
                            prog.episode_number = Some(ep);
                        }
                    } else if prog.episode_number.is_none() && !text.is_empty() {
                        prog.episode_number = Some(text.to_string());
                    }
                }
                self.state = ParserState::Programme;
            }
            _ => {}
        }
    }

    /// Drops the element being built after a syntax error.
    fn reset(&mut self) {
        self.channel = None;
        self.programme = None;
        self.state = ParserState::Root;
        self.text.clear();
    }
}

/// Streams the document once, handing complete items to `on_item`.
fn walk<F>(xml: &[u8], pass: Pass, mut on_item: F) -> Result<WalkStats, FetchError>
where
    F: FnMut(Item),
{
    let mut reader = Reader::from_reader(xml);
    // tolerate mismatched end tags; the state machine matches by name
    reader.config_mut().check_end_names = false;

    let mut walker = Walker::new(pass);
    let mut stats = WalkStats::default();
    let mut buf = Vec::with_capacity(8192);

    loop {
        let position = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => walker.start(e),
            Ok(Event::Empty(ref e)) => {
                // <x/> is a start immediately followed by its end
                walker.start(e);
                walker.end(e.name().as_ref(), &mut on_item);
            }
            Ok(Event::Text(e)) => {
                let raw = String::from_utf8_lossy(&e);
                walker.text(&decode_xml_entities(&raw));
            }
            Ok(Event::CData(e)) => walker.text(&String::from_utf8_lossy(&e)),
            Ok(Event::GeneralRef(e)) => {
                let entity = format!("&{};", String::from_utf8_lossy(&e));
                walker.text(&decode_xml_entities(&entity));
            }
            Ok(Event::End(ref e)) => walker.end(e.name().as_ref(), &mut on_item),
            Ok(Event::Eof) => break,
            Err(e) => {
                stats.errors += 1;
                if pass == Pass::Channels && stats.errors <= MAX_LOGGED_ERRORS {
                    debug!(position, error = %e, "XMLTV syntax error, skipping element");
                }
                walker.reset();
                if reader.buffer_position() <= position {
                    // no progress possible
                    break;
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if !walker.saw_root {
        return Err(FetchError::ShapeMismatch(
            "XMLTV missing <tv> root element".to_string(),
        ));
    }
    Ok(stats)
}

/// Get attribute value from XML element
fn get_attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .map(|attr| decode_xml_entities(&String::from_utf8_lossy(&attr.value)).into_owned())
}

/// Decodes predefined and numeric character references; anything else is
/// left as written.
fn decode_xml_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .get(1..tail.len().min(12))
            .and_then(|window| window.find(';'))
            .and_then(|semi| {
                let entity = &tail[1..=semi];
                resolve_entity(entity).map(|c| (c, semi + 2))
            });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn resolve_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
