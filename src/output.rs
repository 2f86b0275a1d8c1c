use crate::error::Result;
use crate::provider::ConnectionInfo;
use crate::speedtest::SpeedTestResult;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Everything one invocation found out. Fields that were not measured are
/// left out of every rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cpu: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl Report {
    pub fn with_connection(mut self, info: &ConnectionInfo) -> Self {
        self.ipv4 = info.ipv4.clone();
        self.ipv6 = info.ipv6.clone();
        self.region = info.region.clone();
        if let Some(isp) = &info.isp {
            self.isp = Some(isp.name.clone());
            self.asn = Some(isp.asn);
        }
        self
    }

    pub fn with_system(mut self) -> Self {
        self.os = Some(std::env::consts::OS.to_string());
        self.arch = Some(std::env::consts::ARCH.to_string());
        self.num_cpu = std::thread::available_parallelism()
            .map(|n| n.get())
            .ok();
        self.time = Some(chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
        self
    }

    pub fn with_speed(mut self, result: &SpeedTestResult) -> Self {
        self.download_mbps = Some(result.download_mbps);
        self.upload_mbps = Some(result.upload_mbps);
        self.latency_ms = result.latency_ms();
        self
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- Yandex Internetometer CLI ---");

        if let Some(ipv4) = &self.ipv4 {
            let _ = writeln!(out, "IPv4: {ipv4}");
        }
        match &self.ipv6 {
            Some(ipv6) => {
                let _ = writeln!(out, "IPv6: {ipv6}");
            }
            None if self.ipv4.is_some() => {
                let _ = writeln!(out, "IPv6: -");
            }
            None => {}
        }
        if let Some(region) = &self.region {
            let _ = writeln!(out, "Region:   {region}");
        }
        if let Some(isp) = &self.isp {
            let _ = writeln!(out, "ISP:      {isp} (AS{})", self.asn.unwrap_or(0));
        }
        if let Some(download) = self.download_mbps {
            let _ = writeln!(out, "Download: {download:.2} Mbps");
        }
        if let Some(upload) = self.upload_mbps {
            let _ = writeln!(out, "Upload:   {upload:.2} Mbps");
        }
        match self.latency_ms {
            Some(latency) => {
                let _ = writeln!(out, "Latency:  {latency} ms");
            }
            None if self.download_mbps.is_some() => {
                let _ = writeln!(out, "Latency:  -");
            }
            None => {}
        }
        if let Some(os) = &self.os {
            let _ = writeln!(out, "OS:       {os} ({})", self.arch.as_deref().unwrap_or("-"));
        }
        if let Some(time) = &self.time {
            let _ = writeln!(out, "Time:     {time}");
        }
        out
    }

    pub fn render_prometheus(&self) -> String {
        let mut labels = Vec::new();
        if let Some(isp) = &self.isp {
            labels.push(format!("isp={}", quote_label(isp)));
        }
        if let Some(region) = &self.region {
            labels.push(format!("region={}", quote_label(region)));
        }
        let labels = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };

        let mut out = String::new();
        let _ = writeln!(out, "# HELP internetometer_download_mbps Download speed in Mbps");
        let _ = writeln!(out, "# TYPE internetometer_download_mbps gauge");
        let _ = writeln!(
            out,
            "internetometer_download_mbps{labels} {:.2}",
            self.download_mbps.unwrap_or(0.0)
        );
        let _ = writeln!(out, "# HELP internetometer_upload_mbps Upload speed in Mbps");
        let _ = writeln!(out, "# TYPE internetometer_upload_mbps gauge");
        let _ = writeln!(
            out,
            "internetometer_upload_mbps{labels} {:.2}",
            self.upload_mbps.unwrap_or(0.0)
        );
        if let Some(latency) = self.latency_ms {
            let _ = writeln!(out, "# HELP internetometer_latency_ms Network latency in milliseconds");
            let _ = writeln!(out, "# TYPE internetometer_latency_ms gauge");
            let _ = writeln!(out, "internetometer_latency_ms{labels} {latency}");
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Appends the report as a single JSON line, creating the file if needed.
    pub fn append_jsonl(&self, path: &Path) -> Result<()> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

fn quote_label(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}
