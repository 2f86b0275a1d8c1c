use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://yandex.ru/internet";
/// Headers the probe hosts expect on measurement traffic.
pub const SITE_REFERER: &str = "https://yandex.ru/internet";
pub const ROOT_REFERER: &str = "https://yandex.ru/";
pub const SITE_ORIGIN: &str = "https://yandex.ru";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const MEASUREMENT_WINDOW: Duration = Duration::from_secs(8);
pub const UPLOAD_PAYLOAD_BYTES: u64 = 50 * 1024 * 1024;
pub const LATENCY_ROUNDS: usize = 3;
pub const RUN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub user_agent: String,
    /// "en" scrapes yandex.com, anything else yandex.ru.
    pub language: String,
    pub concurrency: usize,
    pub window: Duration,
    pub upload_size_mb: u64,
    pub latency_rounds: usize,
    /// Bounds the whole run and every single HTTP request.
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            language: "en".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            window: MEASUREMENT_WINDOW,
            upload_size_mb: UPLOAD_PAYLOAD_BYTES / (1024 * 1024),
            latency_rounds: LATENCY_ROUNDS,
            timeout: RUN_TIMEOUT,
        }
    }
}

impl Settings {
    pub fn upload_size_bytes(&self) -> u64 {
        self.upload_size_mb * 1024 * 1024
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
    }
}

/// Worker count to use for a caller-requested value; never below one.
pub fn effective_concurrency(requested: i64) -> usize {
    if requested <= 0 {
        DEFAULT_CONCURRENCY
    } else {
        requested as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Concurrency,
    LatencyRounds,
    UploadSize,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::Concurrency => SettingsField::LatencyRounds,
            SettingsField::LatencyRounds => SettingsField::UploadSize,
            SettingsField::UploadSize => SettingsField::Concurrency,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SettingsField::Concurrency => SettingsField::UploadSize,
            SettingsField::LatencyRounds => SettingsField::Concurrency,
            SettingsField::UploadSize => SettingsField::LatencyRounds,
        }
    }
}
