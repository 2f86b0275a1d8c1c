use super::counter::ByteCounter;
use super::progress::EventSink;
use super::worker::{StreamWorker, Transfer};
use super::Direction;
use crate::settings::{DEFAULT_CONCURRENCY, UPLOAD_PAYLOAD_BYTES};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The span of one throughput phase.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementWindow {
    pub start: Instant,
    pub target: Duration,
    pub concurrency: usize,
}

impl MeasurementWindow {
    pub fn open(target: Duration, concurrency: usize) -> Self {
        Self {
            start: Instant::now(),
            target,
            concurrency: if concurrency == 0 {
                DEFAULT_CONCURRENCY
            } else {
                concurrency
            },
        }
    }

    pub fn deadline(&self) -> Instant {
        self.start + self.target
    }
}

/// Rate in bits per second for `bytes` moved over `elapsed` wall time.
pub fn bits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs
}

/// Drives a pool of [`StreamWorker`]s against one URL for one window.
#[derive(Debug, Clone)]
pub struct ThroughputMeasurer {
    client: reqwest::Client,
    sink: EventSink,
    upload_size: u64,
}

impl ThroughputMeasurer {
    pub fn new(client: reqwest::Client, sink: EventSink) -> Self {
        Self {
            client,
            sink,
            upload_size: UPLOAD_PAYLOAD_BYTES,
        }
    }

    pub fn with_upload_size(mut self, upload_size: u64) -> Self {
        self.upload_size = upload_size;
        self
    }

    /// Measures `direction` against `url` and returns bits per second.
    ///
    /// The phase ends when `window` elapses, `cancel` fires or every worker
    /// has given up, whichever comes first. Workers that all fail yield `0.0`.
    pub async fn measure(
        &self,
        direction: Direction,
        url: &str,
        concurrency: usize,
        window: Duration,
        cancel: &CancellationToken,
    ) -> f64 {
        let window = MeasurementWindow::open(window, concurrency);
        let counter = ByteCounter::new();
        let phase_cancel = cancel.child_token();

        let transfer = Arc::new(Transfer {
            client: self.client.clone(),
            url: url.to_string(),
            direction,
            upload_size: self.upload_size,
            counter: counter.clone(),
            sink: self.sink.clone(),
        });

        let mut workers = JoinSet::new();
        for id in 0..window.concurrency {
            let worker = StreamWorker::new(
                id,
                Arc::clone(&transfer),
                phase_cancel.clone(),
                window.deadline(),
            );
            workers.spawn(worker.run());
        }

        tokio::select! {
            _ = tokio::time::sleep_until(window.deadline()) => {}
            _ = cancel.cancelled() => debug!(direction = direction.label(), "phase cancelled"),
            _ = async { while workers.join_next().await.is_some() {} } => {
                debug!(direction = direction.label(), "all workers finished early");
            }
        }

        phase_cancel.cancel();
        while workers.join_next().await.is_some() {}

        let elapsed = window.start.elapsed();
        let bytes = counter.snapshot();
        let rate = bits_per_second(bytes, elapsed);
        info!(
            direction = direction.label(),
            bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            mbps = rate / 1_000_000.0,
            "window closed"
        );
        rate
    }
}
