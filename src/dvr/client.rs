//! DVR REST client
//!
//! Bearer-token authenticated access to series rules, recurring rules and
//! recordings. The token is requested on first use and kept for the lifetime
//! of the client.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use super::wire;
use crate::config::DvrSettings;
use crate::error::FetchError;
use crate::json_scan::{extract_bool, extract_string, for_each_object};
use crate::models::{Recording, RecurringRule, SeriesRule};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport, UreqTransport};

const TOKEN_PATH: &str = "/api/accounts/token/";
const SERIES_RULES_PATH: &str = "/api/channels/series-rules/";
const RECURRING_RULES_PATH: &str = "/api/channels/recurring-rules/";
const RECORDINGS_PATH: &str = "/api/channels/recordings/";

pub struct DvrClient<T = UreqTransport> {
    settings: DvrSettings,
    transport: T,
    token: Mutex<Option<String>>,
}

impl DvrClient<UreqTransport> {
    pub fn new(settings: DvrSettings) -> Self {
        let transport = UreqTransport::with_timeout_secs(settings.timeout_seconds);
        Self::with_transport(settings, transport)
    }
}

impl<T: Transport> DvrClient<T> {
    pub fn with_transport(settings: DvrSettings, transport: T) -> Self {
        Self {
            settings,
            transport,
            token: Mutex::new(None),
        }
    }

    /// `http://server[:port]`, or `None` when no server is configured.
    ///
    /// Port 80 and 0 are left implicit, as is the port of a server given with
    /// a scheme and its own port.
    pub fn base_url(&self) -> Option<String> {
        let server = self.settings.server.trim().trim_end_matches('/');
        if server.is_empty() {
            return None;
        }

        let port = self.settings.port;
        let (base, has_port) = match server
            .strip_prefix("http://")
            .or_else(|| server.strip_prefix("https://"))
        {
            Some(host) => (server.to_string(), host.contains(':')),
            None => (format!("http://{}", server), server.contains(':')),
        };
        if port != 80 && port > 0 && !has_port {
            Some(format!("{}:{}", base, port))
        } else {
            Some(base)
        }
    }

    fn url(&self, path: &str) -> Result<String, FetchError> {
        let base = self
            .base_url()
            .ok_or_else(|| FetchError::InvalidSettings("DVR server is empty".to_string()))?;
        Ok(format!("{}{}", base, path))
    }

    pub fn has_token(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Forget the cached token; the next call authenticates again.
    pub fn invalidate_token(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Cached token, exchanging the credentials for one if needed.
    ///
    /// The lock is held across the exchange so concurrent callers wait for a
    /// single request instead of racing their own.
    fn ensure_token(&self) -> Result<String, FetchError> {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let url = self.url(TOKEN_PATH)?;
        debug!(url = %url, "Requesting DVR token");
        let request = HttpRequest::post(
            url,
            wire::token_body(&self.settings.username, &self.settings.password),
        )
        .header("Content-Type", "application/json");

        let response = self.transport.fetch(&request)?;
        if !response.is_success() {
            warn!(user = %self.settings.username, status = %response.status_line, "DVR authentication failed");
            return Err(FetchError::Auth(response.status_line));
        }

        let token = extract_string(&response.text(), "access")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                warn!(user = %self.settings.username, "DVR token response has no access token");
                FetchError::Auth("no access token in response".to_string())
            })?;

        info!("Authenticated with DVR");
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Authenticated request; a 401 drops the cached token.
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<HttpResponse, FetchError> {
        let url = self.url(path)?;
        let token = self.ensure_token()?;
        debug!(method = method.as_str(), url = %url, "DVR request");

        let request = match (method, body) {
            (Method::Post, Some(body)) => HttpRequest::post(url, body),
            (Method::Post, None) => HttpRequest::post(url, ""),
            (Method::Delete, _) => HttpRequest::delete(url),
            (Method::Get, _) => HttpRequest::get(url),
        }
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", token));

        let response = self.transport.fetch(&request)?;
        if response.status == 401 {
            warn!(path, "DVR rejected token, dropping it");
            self.invalidate_token();
            return Err(FetchError::Auth(response.status_line));
        }
        if !response.is_success() {
            warn!(path, status = %response.status_line, "Unexpected DVR status");
            return Err(FetchError::Transport(response.status_line));
        }
        Ok(response)
    }

    #[instrument(skip_all)]
    pub fn list_series_rules(&self) -> Result<Vec<SeriesRule>, FetchError> {
        let response = self.send(Method::Get, SERIES_RULES_PATH, None)?;
        let rules = wire::parse_series_rules(&response.text()).ok_or_else(|| {
            FetchError::ShapeMismatch("Series rules response has no \"rules\" array".to_string())
        })?;
        info!(count = rules.len(), "Fetched series rules");
        Ok(rules)
    }

    /// Empty `title`/`mode` are left out of the request.
    #[instrument(skip(self))]
    pub fn add_series_rule(&self, tvg_id: &str, title: &str, mode: &str) -> Result<(), FetchError> {
        let body = wire::series_rule_body(tvg_id, title, mode);
        let response = self.send(Method::Post, SERIES_RULES_PATH, Some(body))?;
        if extract_bool(&response.text(), "success") != Some(true) {
            return Err(FetchError::Rejected(format!(
                "series rule for {} was not accepted",
                tvg_id
            )));
        }
        info!(tvg_id, "Added series rule");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_series_rule(&self, tvg_id: &str) -> Result<(), FetchError> {
        let path = format!("{}{}/", SERIES_RULES_PATH, urlencoding::encode(tvg_id));
        self.send(Method::Delete, &path, None)?;
        info!(tvg_id, "Deleted series rule");
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn list_recurring_rules(&self) -> Result<Vec<RecurringRule>, FetchError> {
        let response = self.send(Method::Get, RECURRING_RULES_PATH, None)?;
        let body = response.text();

        let mut rules = Vec::new();
        let is_array = for_each_object(&body, |obj| {
            if let Some(rule) = wire::parse_recurring_rule(obj) {
                rules.push(rule);
            }
        });
        if !is_array {
            return Err(FetchError::ShapeMismatch(
                "Recurring rules response was not a JSON array".to_string(),
            ));
        }
        info!(count = rules.len(), "Fetched recurring rules");
        Ok(rules)
    }

    /// `rule.id` is assigned by the server and not sent.
    #[instrument(skip_all, fields(channel = rule.channel_id))]
    pub fn add_recurring_rule(&self, rule: &RecurringRule) -> Result<(), FetchError> {
        let body = wire::recurring_rule_body(rule);
        self.send(Method::Post, RECURRING_RULES_PATH, Some(body))?;
        info!(name = %rule.name, "Added recurring rule");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_recurring_rule(&self, id: u32) -> Result<(), FetchError> {
        let path = format!("{}{}/", RECURRING_RULES_PATH, id);
        self.send(Method::Delete, &path, None)?;
        info!(id, "Deleted recurring rule");
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn list_recordings(&self) -> Result<Vec<Recording>, FetchError> {
        let response = self.send(Method::Get, RECORDINGS_PATH, None)?;
        let body = response.text();
        let base = self.url("")?;

        let mut recordings = Vec::new();
        let is_array = for_each_object(&body, |obj| {
            if let Some(rec) = wire::parse_recording(obj, &base) {
                recordings.push(rec);
            }
        });
        if !is_array {
            return Err(FetchError::ShapeMismatch(
                "Recordings response was not a JSON array".to_string(),
            ));
        }
        info!(count = recordings.len(), "Fetched recordings");
        Ok(recordings)
    }

    #[instrument(skip(self))]
    pub fn delete_recording(&self, id: u32) -> Result<(), FetchError> {
        let path = format!("{}{}/", RECORDINGS_PATH, id);
        self.send(Method::Delete, &path, None)?;
        info!(id, "Deleted recording");
        Ok(())
    }

    /// One-off recording of `channel_id` between two Unix timestamps.
    #[instrument(skip(self))]
    pub fn schedule_recording(
        &self,
        channel_id: u32,
        start: i64,
        end: i64,
        title: &str,
    ) -> Result<(), FetchError> {
        let body = wire::recording_body(channel_id, start, end, title);
        self.send(Method::Post, RECORDINGS_PATH, Some(body))?;
        info!(channel_id, title, "Scheduled recording");
        Ok(())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
