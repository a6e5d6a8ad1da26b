//! JSON shapes exchanged with the DVR API

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};

use crate::json_scan::{extract_bool, extract_int, extract_raw, extract_string, for_each_object};
use crate::models::{Recording, RecurringRule, SeriesRule};

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// `YYYY-MM-DDTHH:MM:SSZ` to a Unix timestamp; anything else is 0.
pub fn parse_iso_time(value: &str) -> i64 {
    let value = value.trim();
    if !is_iso_shape(value.as_bytes()) {
        return 0;
    }
    NaiveDateTime::parse_from_str(value, ISO_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Exactly `DDDD-DD-DDTDD:DD:DDZ`; chrono alone also takes unpadded fields.
fn is_iso_shape(b: &[u8]) -> bool {
    b.len() == 20
        && b.iter().enumerate().all(|(i, &c)| match i {
            4 | 7 => c == b'-',
            10 => c == b'T',
            13 | 16 => c == b':',
            19 => c == b'Z',
            _ => c.is_ascii_digit(),
        })
}

pub fn format_iso_time(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .unwrap_or_default()
        .format(ISO_FORMAT)
        .to_string()
}

pub(crate) fn token_body(username: &str, password: &str) -> String {
    json!({ "username": username, "password": password }).to_string()
}

pub(crate) fn series_rule_body(tvg_id: &str, title: &str, mode: &str) -> String {
    let mut body = Map::new();
    body.insert("tvg_id".to_string(), Value::from(tvg_id));
    if !title.is_empty() {
        body.insert("title".to_string(), Value::from(title));
    }
    if !mode.is_empty() {
        body.insert("mode".to_string(), Value::from(mode));
    }
    Value::Object(body).to_string()
}

pub(crate) fn recurring_rule_body(rule: &RecurringRule) -> String {
    json!({
        "channel": rule.channel_id,
        "name": rule.name,
        "start_time": rule.start_time,
        "end_time": rule.end_time,
        "start_date": rule.start_date,
        "end_date": rule.end_date,
        "enabled": rule.enabled,
        "days_of_week": rule.days_of_week,
    })
    .to_string()
}

pub(crate) fn recording_body(channel_id: u32, start: i64, end: i64, title: &str) -> String {
    json!({
        "channel": channel_id,
        "start_time": format_iso_time(start),
        "end_time": format_iso_time(end),
        "custom_properties": { "program": { "title": title } },
    })
    .to_string()
}

/// Rules from `{"rules": [...]}`; `None` when the wrapper is missing.
pub(crate) fn parse_series_rules(body: &str) -> Option<Vec<SeriesRule>> {
    let rules = extract_raw(body, "rules")?;
    let mut out = Vec::new();
    let is_array = for_each_object(rules, |obj| {
        if let Some(tvg_id) = extract_string(obj, "tvg_id") {
            out.push(SeriesRule {
                tvg_id,
                title: extract_string(obj, "title").unwrap_or_default(),
                mode: extract_string(obj, "mode").unwrap_or_default(),
            });
        }
    });
    is_array.then_some(out)
}

pub(crate) fn parse_recurring_rule(obj: &str) -> Option<RecurringRule> {
    let id = u32::try_from(extract_int(obj, "id")?).ok()?;
    Some(RecurringRule {
        id,
        channel_id: extract_u32(obj, "channel"),
        days_of_week: extract_raw(obj, "days_of_week")
            .map(parse_days)
            .unwrap_or_default(),
        start_time: extract_string(obj, "start_time").unwrap_or_default(),
        end_time: extract_string(obj, "end_time").unwrap_or_default(),
        start_date: extract_string(obj, "start_date").unwrap_or_default(),
        end_date: extract_string(obj, "end_date").unwrap_or_default(),
        name: extract_string(obj, "name").unwrap_or_default(),
        enabled: extract_bool(obj, "enabled").unwrap_or(true),
    })
}

/// Builds the record; `base_url` is needed for the playback URL.
pub(crate) fn parse_recording(obj: &str, base_url: &str) -> Option<Recording> {
    let id = u32::try_from(extract_int(obj, "id")?).ok()?;

    let program = extract_raw(obj, "custom_properties").and_then(|p| extract_raw(p, "program"));
    let (title, plot) = match program {
        Some(p) => (
            extract_string(p, "title").unwrap_or_default(),
            extract_string(p, "description").unwrap_or_default(),
        ),
        None => (String::new(), String::new()),
    };

    Some(Recording {
        id,
        channel_id: extract_u32(obj, "channel"),
        title,
        plot,
        stream_url: format!("{}/api/channels/recordings/{}/file/", base_url, id),
        start_time: extract_string(obj, "start_time").map_or(0, |s| parse_iso_time(&s)),
        end_time: extract_string(obj, "end_time").map_or(0, |s| parse_iso_time(&s)),
    })
}

/// Tolerant read of `[1, 3, 5]`: every digit 0-6 inside the brackets.
fn parse_days(raw: &str) -> BTreeSet<u8> {
    let Some(inner) = raw.strip_prefix('[') else {
        return BTreeSet::new();
    };
    let inner = inner.split(']').next().unwrap_or_default();
    inner
        .bytes()
        .filter(|b| (b'0'..=b'6').contains(b))
        .map(|b| b - b'0')
        .collect()
}

fn extract_u32(obj: &str, key: &str) -> u32 {
    extract_int(obj, key)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}
