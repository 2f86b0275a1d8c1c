pub mod counter;
mod download;
pub mod measure;
pub mod null_source;
pub mod ping;
pub mod progress;
pub mod runner;
mod upload;
pub mod worker;

use std::time::Duration;

pub use counter::ByteCounter;
pub use measure::{bits_per_second, MeasurementWindow, ThroughputMeasurer};
pub use null_source::NullSource;
pub use ping::LatencyProbe;
pub use progress::{Direction, EventSink, ProgressSample, RateMeter, TestUpdate};
pub use runner::{select_download_probe, select_upload_probe, SpeedTest};
pub use worker::StreamWorker;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedTestResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    /// `None` when no latency probe answered.
    pub latency: Option<Duration>,
}

impl SpeedTestResult {
    pub fn latency_ms(&self) -> Option<u64> {
        self.latency.map(|latency| latency.as_millis() as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Idle,
    Ping,
    Download,
    Upload,
    Complete,
}
