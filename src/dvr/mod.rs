//! DVR (digital video recorder) module
//!
//! Client for the recorder's REST API and the JSON codec it speaks.

mod client;
mod wire;

pub use client::DvrClient;
pub use wire::{format_iso_time, parse_iso_time};
