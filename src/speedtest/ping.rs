use super::progress::{EventSink, TestUpdate};
use crate::error::{Result, SpeedTestError};
use crate::provider::Probe;
use crate::settings::{LATENCY_ROUNDS, SITE_REFERER};
use reqwest::header::REFERER;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Serial round trips against the latency probes, keeping the fastest one.
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    client: reqwest::Client,
    sink: EventSink,
    rounds: usize,
}

impl LatencyProbe {
    pub fn new(client: reqwest::Client, sink: EventSink) -> Self {
        Self {
            client,
            sink,
            rounds: LATENCY_ROUNDS,
        }
    }

    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    /// Minimum round trip over `rounds` passes across every probe.
    ///
    /// Fails with [`SpeedTestError::NoLatency`] when no attempt got a 200.
    pub async fn measure(&self, probes: &[Probe], cancel: &CancellationToken) -> Result<Duration> {
        let mut attempts = Vec::with_capacity(self.rounds * probes.len());

        'rounds: for _ in 0..self.rounds {
            for probe in probes.iter().filter(|p| !p.url.is_empty()) {
                let rtt = tokio::select! {
                    _ = cancel.cancelled() => break 'rounds,
                    rtt = self.round_trip(probe) => rtt,
                };
                if let Some(rtt) = rtt {
                    self.sink.publish(TestUpdate::LatencySample(rtt));
                }
                attempts.push(rtt);
            }
        }

        minimum_round_trip(attempts).ok_or(SpeedTestError::NoLatency)
    }

    async fn round_trip(&self, probe: &Probe) -> Option<Duration> {
        let mut request = self.client.get(&probe.url).header(REFERER, SITE_REFERER);
        if let Some(timeout) = probe.timeout {
            request = request.timeout(timeout);
        }

        let start = Instant::now();
        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => Some(start.elapsed()),
            Ok(response) => {
                debug!(url = %probe.url, status = %response.status(), "latency probe rejected");
                None
            }
            Err(err) => {
                debug!(url = %probe.url, error = %err, "latency probe failed");
                None
            }
        }
    }
}

/// Fastest successful attempt, `None` when every attempt failed.
pub fn minimum_round_trip(attempts: impl IntoIterator<Item = Option<Duration>>) -> Option<Duration> {
    attempts.into_iter().flatten().min()
}
