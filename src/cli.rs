use clap::Parser;
use internetometer::settings::{effective_concurrency, Settings, DEFAULT_CONCURRENCY};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "internetometer", version)]
#[command(about = "Measure IP, region, ISP, latency and throughput via Yandex Internetometer")]
pub struct Args {
    /// Show IPv4 and IPv6 addresses
    #[arg(long)]
    pub ip: bool,

    /// Run speed test (latency, download, upload)
    #[arg(long)]
    pub speed: bool,

    /// Run all tests and show full info
    #[arg(long)]
    pub all: bool,

    /// Output results in JSON format
    #[arg(long)]
    pub json: bool,

    /// Output results in Prometheus metrics format
    #[arg(long)]
    pub prometheus: bool,

    /// Use interactive TUI for progress
    #[arg(long)]
    pub tui: bool,

    /// Language for region (en or ru)
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Number of concurrent connections for speed test
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY as i64, allow_negative_numbers = true)]
    pub concurrency: i64,

    /// Path to save results in JSONL format
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Timeout for the entire operation, e.g. "60s" or "2m"
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

impl Args {
    pub fn settings(&self) -> Settings {
        Settings {
            language: self.lang.clone(),
            concurrency: effective_concurrency(self.concurrency),
            timeout: self.timeout,
            ..Settings::default()
        }
    }

    /// No output mode picked means the interactive view.
    pub fn wants_tui(&self) -> bool {
        self.tui || !(self.ip || self.speed || self.all || self.prometheus || self.json)
    }

    pub fn wants_info(&self) -> bool {
        self.ip || self.all
    }

    pub fn wants_speed(&self) -> bool {
        self.speed || self.all || self.prometheus
    }

    /// Machine-readable output must not be interleaved with progress lines.
    pub fn quiet(&self) -> bool {
        self.json || self.prometheus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_opens_tui() {
        let args = Args::try_parse_from(["internetometer"]).unwrap();
        assert!(args.wants_tui());
        assert_eq!(args.timeout, Duration::from_secs(60));
        assert_eq!(args.settings().concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn prometheus_implies_speed_and_quiet() {
        let args = Args::try_parse_from(["internetometer", "--prometheus"]).unwrap();
        assert!(!args.wants_tui());
        assert!(args.wants_speed());
        assert!(!args.wants_info());
        assert!(args.quiet());
    }

    #[test]
    fn negative_concurrency_falls_back_to_default() {
        let args =
            Args::try_parse_from(["internetometer", "--speed", "--concurrency", "-2"]).unwrap();
        assert_eq!(args.settings().concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn timeout_accepts_human_durations() {
        let args = Args::try_parse_from(["internetometer", "--all", "--timeout", "2m"]).unwrap();
        assert_eq!(args.settings().timeout, Duration::from_secs(120));
        assert!(args.wants_info() && args.wants_speed());
    }
}
