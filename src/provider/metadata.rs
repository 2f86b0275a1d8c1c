use super::yandex::YandexClient;
use crate::error::{Result, SpeedTestError};
use crate::settings::DEFAULT_BASE_URL;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const IPV4_URL: &str = "https://ipv4-internet.yandex.net/api/v0/ip";
const IPV6_URL: &str = "https://ipv6-internet.yandex.net/api/v0/ip";
const ENGLISH_LANDING_URL: &str = "https://yandex.com/internet";
const UNKNOWN_REGION: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IspInfo {
    pub name: String,
    pub asn: u32,
}

/// Whatever could be learned about the connection. Missing pieces stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub region: Option<String>,
    pub isp: Option<IspInfo>,
}

#[derive(Debug, Deserialize)]
struct RegionInfo {
    name: String,
}

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""clientRegion":(\{[^}]*\})"#).expect("region pattern"))
}

fn asn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""asn":\[(\d+)\]"#).expect("asn pattern"))
}

fn operator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""operatorName":"([^"]*)""#).expect("operator pattern"))
}

/// Region name embedded in the landing page, if the page carries one.
pub fn parse_region(html: &str) -> Option<String> {
    let caps = region_pattern().captures(html)?;
    let info: RegionInfo = serde_json::from_str(&caps[1]).ok()?;
    Some(info.name)
}

pub fn parse_isp(html: &str) -> IspInfo {
    let asn = asn_pattern()
        .captures(html)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0);
    let mut name = operator_pattern()
        .captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();

    if name.is_empty() && asn != 0 {
        name = format!("AS{asn}");
    }

    IspInfo { name, asn }
}

impl YandexClient {
    pub async fn get_ipv4(&self) -> Result<String> {
        self.get_json(IPV4_URL).await
    }

    /// IPv6 is frequently unavailable; that is reported as `None`, not an error.
    pub async fn get_ipv6(&self) -> Option<String> {
        match self.get_json::<String>(IPV6_URL).await {
            Ok(ip) if !ip.is_empty() => Some(ip),
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "no ipv6");
                None
            }
        }
    }

    fn landing_url(&self) -> &str {
        let settings = self.settings();
        if settings.language == "en" && settings.base_url == DEFAULT_BASE_URL {
            ENGLISH_LANDING_URL
        } else {
            &settings.base_url
        }
    }

    pub async fn get_region(&self) -> Result<String> {
        let html = self.get_text(self.landing_url()).await?;
        Ok(parse_region(&html).unwrap_or_else(|| UNKNOWN_REGION.to_string()))
    }

    pub async fn get_isp(&self) -> Result<IspInfo> {
        let html = self.get_text(&self.settings().base_url).await?;
        Ok(parse_isp(&html))
    }

    /// Looks everything up concurrently, logging and skipping what fails.
    ///
    /// Fails only with [`SpeedTestError::Cancelled`] when `cancel` fires first.
    pub async fn connection_info(&self, cancel: &CancellationToken) -> Result<ConnectionInfo> {
        tokio::select! {
            _ = cancel.cancelled() => Err(SpeedTestError::Cancelled),
            info = self.lookup_all() => Ok(info),
        }
    }

    async fn lookup_all(&self) -> ConnectionInfo {
        let (ipv4, ipv6, region, isp) = tokio::join!(
            self.get_ipv4(),
            self.get_ipv6(),
            self.get_region(),
            self.get_isp()
        );

        ConnectionInfo {
            ipv4: ipv4
                .map_err(|err| warn!(error = %err, "ipv4 detection failed"))
                .ok(),
            ipv6,
            region: region
                .map_err(|err| debug!(error = %err, "region lookup failed"))
                .ok(),
            isp: isp
                .map_err(|err| debug!(error = %err, "isp lookup failed"))
                .ok(),
        }
    }
}
