use super::{Probe, ProbeList, ProbeSource};
use crate::error::{Result, SpeedTestError};
use crate::settings::Settings;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct WireProbe {
    #[serde(default)]
    url: String,
    /// Milliseconds.
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireUploadProbe {
    #[serde(default)]
    url: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct WireGroup<T> {
    #[serde(default = "Vec::new")]
    probes: Vec<T>,
}

impl<T> Default for WireGroup<T> {
    fn default() -> Self {
        Self { probes: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct WireProbes {
    #[serde(default)]
    latency: WireGroup<WireProbe>,
    #[serde(default)]
    download: WireGroup<WireProbe>,
    #[serde(default)]
    upload: WireGroup<WireUploadProbe>,
}

impl From<WireProbe> for Probe {
    fn from(wire: WireProbe) -> Self {
        let probe = Probe::from_url(wire.url);
        match wire.timeout {
            Some(ms) if ms > 0 => probe.with_timeout(Duration::from_millis(ms)),
            _ => probe,
        }
    }
}

impl From<WireUploadProbe> for Probe {
    fn from(wire: WireUploadProbe) -> Self {
        let probe = Probe::new(wire.url);
        if wire.size > 0 {
            probe.with_size_hint(wire.size)
        } else {
            probe
        }
    }
}

impl From<WireProbes> for ProbeList {
    fn from(wire: WireProbes) -> Self {
        Self {
            latency: wire.latency.probes.into_iter().map(Probe::from).collect(),
            download: wire.download.probes.into_iter().map(Probe::from).collect(),
            upload: wire.upload.probes.into_iter().map(Probe::from).collect(),
        }
    }
}

/// HTTP client for the Yandex Internetometer endpoints.
#[derive(Debug, Clone)]
pub struct YandexClient {
    http: reqwest::Client,
    settings: Settings,
}

impl YandexClient {
    pub fn new(settings: Settings) -> Result<Self> {
        let http = settings.http_client()?;
        Ok(Self { http, settings })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeedTestError::Status { status, body });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub(crate) async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.http.get(url).send().await?.text().await?)
    }

    pub async fn get_probes(&self) -> Result<ProbeList> {
        let url = format!("{}/api/v0/get-probes", self.settings.base_url);
        let wire: WireProbes = self
            .get_json(&url)
            .await
            .map_err(|err| SpeedTestError::ProbeList(err.to_string()))?;
        Ok(wire.into())
    }
}

impl ProbeSource for YandexClient {
    fn fetch_probes(&self) -> impl Future<Output = Result<ProbeList>> + Send {
        self.get_probes()
    }
}
