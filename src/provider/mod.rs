//! Where probe URLs and connection metadata come from.

pub mod metadata;
pub mod yandex;

use crate::error::Result;
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

pub use metadata::{ConnectionInfo, IspInfo};
pub use yandex::YandexClient;

/// Download probes at or below this size are only good for latency-class tests.
pub const SMALL_PROBE_BYTES: u64 = 100 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub url: String,
    /// Payload size in bytes, when the backend tells us or the URL does.
    pub size_hint: Option<u64>,
    pub timeout: Option<Duration>,
}

impl Probe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size_hint: None,
            timeout: None,
        }
    }

    /// Probe whose size hint is read off size tokens in the URL, e.g. `50mb`.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let size_hint = size_hint_from_url(&url);
        Self {
            url,
            size_hint,
            timeout: None,
        }
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_small(&self) -> bool {
        matches!(self.size_hint, Some(size) if size <= SMALL_PROBE_BYTES)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeList {
    pub latency: Vec<Probe>,
    pub download: Vec<Probe>,
    pub upload: Vec<Probe>,
}

/// Supplies the probes for one speed test session.
pub trait ProbeSource {
    fn fetch_probes(&self) -> impl Future<Output = Result<ProbeList>> + Send;
}

fn size_token() -> &'static Regex {
    static SIZE_TOKEN: OnceLock<Regex> = OnceLock::new();
    SIZE_TOKEN.get_or_init(|| Regex::new(r"(?i)(\d+)(kb|mb|gb)").expect("size token pattern"))
}

/// Bytes named by the first `<n>kb|mb|gb` token in `url`.
pub fn size_hint_from_url(url: &str) -> Option<u64> {
    let caps = size_token().captures(url)?;
    let n: u64 = caps[1].parse().ok()?;
    let unit = match caps[2].to_ascii_lowercase().as_str() {
        "kb" => 1024,
        "mb" => 1024 * 1024,
        _ => 1024 * 1024 * 1024,
    };
    n.checked_mul(unit)
}
