//! Xtream Codes API client
//!
//! Builds `player_api.php` requests, maps the catalog responses into
//! [`LiveCategory`]/[`LiveStream`] records and fetches the XMLTV guide.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::config::ProviderSettings;
use crate::epg::{self, EpgOptions};
use crate::error::FetchError;
use crate::json_scan::{extract_int, extract_string, for_each_object};
use crate::models::{ChannelEpg, LiveCatalog, LiveCategory, LiveStream, StreamFormat};
use crate::transport::{HttpRequest, HttpResponse, Transport, UreqTransport};

/// Sent when spoofing is enabled without a custom value.
pub const DEFAULT_USER_AGENT: &str = "XtreamCodesKodiAddon";

pub struct XtreamClient<T = UreqTransport> {
    settings: ProviderSettings,
    transport: T,
}

impl XtreamClient<UreqTransport> {
    pub fn new(settings: ProviderSettings) -> Self {
        let transport = UreqTransport::with_timeout_secs(settings.timeout_seconds);
        Self::with_transport(settings, transport)
    }
}

impl<T: Transport> XtreamClient<T> {
    pub fn with_transport(settings: ProviderSettings, transport: T) -> Self {
        Self { settings, transport }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// `scheme://host[:port]`, or `None` when no server is configured.
    ///
    /// A server given with a scheme is trusted as is, apart from appending
    /// the port when its host part has none.
    pub fn base_url(&self) -> Option<String> {
        let server = self.settings.server.trim().trim_end_matches('/');
        if server.is_empty() {
            return None;
        }

        let port = self.settings.port;
        if let Some(host) = server
            .strip_prefix("http://")
            .or_else(|| server.strip_prefix("https://"))
        {
            if host.contains(':') || port == 0 {
                return Some(server.to_string());
            }
            return Some(format!("{}:{}", server, port));
        }

        if port == 0 {
            Some(format!("http://{}", server))
        } else {
            Some(format!("http://{}:{}", server, port))
        }
    }

    fn player_api_url(&self) -> Option<String> {
        let base = self.base_url()?;
        Some(format!(
            "{}/player_api.php?username={}&password={}",
            base,
            urlencoding::encode(&self.settings.username),
            urlencoding::encode(&self.settings.password)
        ))
    }

    fn api_url(&self, action: &str) -> Option<String> {
        let base = self.player_api_url()?;
        Some(format!("{}&action={}", base, urlencoding::encode(action)))
    }

    fn xmltv_url(&self) -> Option<String> {
        let base = self.base_url()?;
        Some(format!(
            "{}/xmltv.php?username={}&password={}",
            base,
            urlencoding::encode(&self.settings.username),
            urlencoding::encode(&self.settings.password)
        ))
    }

    /// User agent to send, if spoofing is enabled.
    pub fn user_agent(&self) -> Option<&str> {
        if !self.settings.enable_user_agent_spoofing {
            return None;
        }
        let custom = self.settings.custom_user_agent.trim();
        Some(if custom.is_empty() { DEFAULT_USER_AGENT } else { custom })
    }

    /// GET `url`; non-2xx becomes [`FetchError::Transport`] with the status line.
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        debug!(url = %redact_credentials(url), "HTTP GET");

        let mut request = HttpRequest::get(url);
        if let Some(ua) = self.user_agent() {
            request = request.header("User-Agent", ua);
        }

        let response = self.transport.fetch(&request).map_err(|e| {
            warn!(url = %redact_credentials(url), error = %e, "Request failed");
            FetchError::from(e)
        })?;

        if !response.is_success() {
            warn!(url = %redact_credentials(url), status = %response.status_line, "Unexpected HTTP status");
            return Err(FetchError::Transport(response.status_line));
        }
        Ok(response)
    }

    /// Checks the settings and that the server answers like an Xtream panel.
    ///
    /// Returns the status line on success.
    #[instrument(skip_all)]
    pub fn test_connection(&self) -> Result<String, FetchError> {
        self.settings
            .validate()
            .map_err(|msg| FetchError::InvalidSettings(msg.to_string()))?;

        let url = self
            .player_api_url()
            .ok_or_else(|| FetchError::InvalidSettings("Failed to build API URL".to_string()))?;
        let response = self.get(&url)?;

        let body = response.text().to_lowercase();
        let looks_xtream = body.contains("\"user_info\"")
            || body.contains("\"server_info\"")
            || body.contains("\"auth\":1");
        if !looks_xtream {
            if response.status != 200 && response.status != 201 {
                warn!(status = %response.status_line, "Response is not an Xtream panel");
                return Err(FetchError::ShapeMismatch(response.status_line));
            }
            debug!("Response has no Xtream signature, accepting on HTTP status");
        }
        info!(status = %response.status_line, "Connection test passed");
        Ok(response.status_line)
    }

    /// Live categories; an empty list is reported as [`FetchError::EmptyResult`].
    #[instrument(skip_all)]
    pub fn fetch_categories(&self) -> Result<Vec<LiveCategory>, FetchError> {
        let url = self.api_url("get_live_categories").ok_or_else(|| {
            FetchError::InvalidSettings("Failed to build categories URL".to_string())
        })?;
        let response = self.get(&url)?;
        let body = response.text();

        let mut categories = Vec::new();
        let mut skipped = 0usize;
        let is_array = for_each_object(&body, |obj| match parse_category(obj) {
            Some(c) => categories.push(c),
            None => skipped += 1,
        });

        if !is_array {
            return Err(FetchError::ShapeMismatch(
                "Categories response was not a JSON array".to_string(),
            ));
        }
        if skipped > 0 {
            debug!(skipped, "Skipped categories without a valid id");
        }
        if categories.is_empty() {
            return Err(FetchError::EmptyResult("No categories parsed".to_string()));
        }

        info!(count = categories.len(), "Fetched live categories");
        Ok(categories)
    }

    /// Live streams of one category, or of all categories when `category_id` is 0.
    #[instrument(skip(self))]
    pub fn fetch_streams(&self, category_id: u32) -> Result<Vec<LiveStream>, FetchError> {
        let mut url = self.api_url("get_live_streams").ok_or_else(|| {
            FetchError::InvalidSettings("Failed to build streams URL".to_string())
        })?;
        if category_id > 0 {
            url.push_str(&format!("&category_id={}", category_id));
        }
        let response = self.get(&url)?;
        let body = response.text();

        let mut streams = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let is_array = for_each_object(&body, |obj| match parse_stream(obj) {
            Some(s) if seen.insert(s.id) => streams.push(s),
            _ => skipped += 1,
        });

        if !is_array {
            return Err(FetchError::ShapeMismatch(
                "Streams response was not a JSON array".to_string(),
            ));
        }
        if skipped > 0 {
            debug!(skipped, "Skipped streams without a valid or unique id");
        }
        if streams.is_empty() {
            return Err(FetchError::EmptyResult("No streams parsed".to_string()));
        }

        info!(count = streams.len(), "Fetched live streams");
        Ok(streams)
    }

    /// Categories plus every live stream.
    ///
    /// Uses the single bulk request when the provider supports it; otherwise
    /// walks the categories in order. Any per-category failure aborts the
    /// whole fetch.
    #[instrument(skip_all)]
    pub fn fetch_all_live_streams(&self) -> Result<LiveCatalog, FetchError> {
        let categories = self.fetch_categories()?;

        let bulk_err = match self.fetch_streams(0) {
            Ok(streams) => return Ok(LiveCatalog { categories, streams }),
            Err(e) => e,
        };
        warn!(error = %bulk_err, "Bulk stream fetch failed, falling back to per-category requests");

        let mut streams: Vec<LiveStream> = Vec::new();
        let mut seen = HashSet::new();
        for category in &categories {
            let batch = self.fetch_streams(category.id).map_err(|e| {
                warn!(category_id = category.id, error = %e, "Category stream fetch failed");
                e
            })?;
            streams.extend(batch.into_iter().filter(|s| seen.insert(s.id)));
        }

        info!(
            categories = categories.len(),
            streams = streams.len(),
            "Fetched live catalog per category"
        );
        Ok(LiveCatalog { categories, streams })
    }

    /// Playable URL for a live stream; no request is made.
    pub fn build_live_stream_url(&self, stream_id: u32, format: StreamFormat) -> Option<String> {
        if stream_id == 0 {
            return None;
        }
        let base = self.base_url()?;
        Some(format!(
            "{}/live/{}/{}/{}{}",
            base,
            urlencoding::encode(&self.settings.username),
            urlencoding::encode(&self.settings.password),
            stream_id,
            format.extension()
        ))
    }

    /// Raw XMLTV document (possibly gzip-compressed).
    #[instrument(skip_all)]
    pub fn fetch_xmltv(&self) -> Result<Vec<u8>, FetchError> {
        let url = self
            .xmltv_url()
            .ok_or_else(|| FetchError::InvalidSettings("Failed to build base URL".to_string()))?;
        let response = self.get(&url)?;
        let body = response.body;

        if body.is_empty() {
            return Err(FetchError::EmptyResult("XMLTV response is empty".to_string()));
        }
        if !epg::looks_like_xmltv(&body) {
            return Err(FetchError::ShapeMismatch(
                "XMLTV response doesn't appear to be XML".to_string(),
            ));
        }

        info!(bytes = body.len(), "Fetched XMLTV guide");
        Ok(body)
    }

    /// Fetches the guide and joins it against `streams`.
    pub fn fetch_epg(
        &self,
        streams: &[LiveStream],
        options: &EpgOptions,
    ) -> Result<Vec<ChannelEpg>, FetchError> {
        let xml = self.fetch_xmltv()?;
        epg::parse_xmltv(&xml, streams, options)
    }
}

fn parse_category(obj: &str) -> Option<LiveCategory> {
    let id = positive_id(extract_int(obj, "category_id")?)?;
    Some(LiveCategory {
        id,
        name: extract_string(obj, "category_name").unwrap_or_default(),
    })
}

fn parse_stream(obj: &str) -> Option<LiveStream> {
    let id = positive_id(extract_int(obj, "stream_id")?)?;
    Some(LiveStream {
        id,
        category_id: extract_int(obj, "category_id")
            .and_then(positive_id)
            .unwrap_or(0),
        number: extract_int(obj, "num").and_then(positive_id).unwrap_or(0),
        name: extract_string(obj, "name").unwrap_or_default(),
        icon: extract_string(obj, "stream_icon").unwrap_or_default(),
    })
}

fn positive_id(v: i64) -> Option<u32> {
    u32::try_from(v).ok().filter(|id| *id > 0)
}

/// Replaces `username=`/`password=` query values with `***` for logging.
pub fn redact_credentials(url: &str) -> String {
    let mut out = url.to_string();
    for key in ["username=", "password="] {
        let mut from = 0;
        while let Some(found) = out[from..].find(key) {
            let value_start = from + found + key.len();
            let value_end = out[value_start..]
                .find('&')
                .map_or(out.len(), |i| value_start + i);
            out.replace_range(value_start..value_end, "***");
            from = value_start + 3;
        }
    }
    out
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
