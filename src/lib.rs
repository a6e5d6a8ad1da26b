//! Xtream PVR core
//!
//! Live catalog and XMLTV guide ingestion for Xtream Codes providers, plus a
//! client for the DVR REST API. Everything runs over fully buffered response
//! bodies obtained through the [`transport::Transport`] trait.

pub mod api;
pub mod config;
pub mod dvr;
pub mod epg;
pub mod error;
pub mod json_scan;
pub mod models;
pub mod transport;

pub use api::XtreamClient;
pub use config::{AppConfig, DvrSettings, EpgSettings, ProviderSettings};
pub use dvr::DvrClient;
pub use epg::{EpgOptions, OffsetHandling};
pub use error::FetchError;
pub use models::*;
pub use transport::{Transport, UreqTransport};
