use super::measure::ThroughputMeasurer;
use super::ping::LatencyProbe;
use super::progress::{EventSink, TestUpdate};
use super::{Direction, SpeedTestResult, TestPhase};
use crate::error::{Result, SpeedTestError};
use crate::provider::{Probe, ProbeList, ProbeSource};
use crate::settings::Settings;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Picks the download probe: the largest known size among probes that are not
/// small-class, the first such probe when no size is known, and the first
/// listed probe when every probe is small.
pub fn select_download_probe(probes: &[Probe]) -> Option<&Probe> {
    let mut best: Option<&Probe> = None;
    for probe in probes.iter().filter(|p| !p.url.is_empty() && !p.is_small()) {
        best = match best {
            Some(current) if probe.size_hint.unwrap_or(0) <= current.size_hint.unwrap_or(0) => {
                Some(current)
            }
            _ => Some(probe),
        };
    }
    best.or_else(|| probes.first())
}

/// First listed upload probe, no filtering.
pub fn select_upload_probe(probes: &[Probe]) -> Option<&Probe> {
    probes.first()
}

/// Latency, then download, then upload, against probes from `P`.
pub struct SpeedTest<P> {
    provider: P,
    settings: Settings,
    sink: EventSink,
    latency: LatencyProbe,
    measurer: ThroughputMeasurer,
}

impl<P: ProbeSource> SpeedTest<P> {
    pub fn new(provider: P, client: reqwest::Client, settings: Settings, sink: EventSink) -> Self {
        let latency =
            LatencyProbe::new(client.clone(), sink.clone()).with_rounds(settings.latency_rounds);
        let measurer = ThroughputMeasurer::new(client, sink.clone())
            .with_upload_size(settings.upload_size_bytes());
        Self {
            provider,
            settings,
            sink,
            latency,
            measurer,
        }
    }

    /// Runs every phase the probe list allows.
    ///
    /// Only a failed probe list fetch is an error. Phases that fail keep their
    /// zero value. When the run timeout fires, in-flight phases are cancelled
    /// and whatever was measured so far is returned.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<SpeedTestResult> {
        let token = cancel.child_token();
        let phases = self.run_phases(&token);
        tokio::pin!(phases);

        tokio::select! {
            result = &mut phases => return result,
            _ = tokio::time::sleep(self.settings.timeout) => {}
        }

        warn!(timeout = ?self.settings.timeout, "speed test timed out");
        token.cancel();
        phases.await
    }

    async fn run_phases(&self, cancel: &CancellationToken) -> Result<SpeedTestResult> {
        let probes = tokio::select! {
            _ = cancel.cancelled() => return Err(SpeedTestError::Cancelled),
            probes = self.provider.fetch_probes() => probes?,
        };

        let mut result = SpeedTestResult::default();

        if !probes.latency.is_empty() {
            result.latency = self.latency_phase(&probes, cancel).await;
        }

        if let Some(probe) = select_download_probe(&probes.download) {
            result.download_mbps = self.throughput_phase(Direction::Download, probe, cancel).await;
            self.sink
                .announce(TestUpdate::DownloadComplete {
                    speed_mbps: result.download_mbps,
                })
                .await;
        }

        if let Some(probe) = select_upload_probe(&probes.upload) {
            result.upload_mbps = self.throughput_phase(Direction::Upload, probe, cancel).await;
            self.sink
                .announce(TestUpdate::UploadComplete {
                    speed_mbps: result.upload_mbps,
                })
                .await;
        }

        self.sink
            .announce(TestUpdate::PhaseStarted(TestPhase::Complete))
            .await;
        Ok(result)
    }

    async fn latency_phase(
        &self,
        probes: &ProbeList,
        cancel: &CancellationToken,
    ) -> Option<std::time::Duration> {
        self.sink
            .announce(TestUpdate::PhaseStarted(TestPhase::Ping))
            .await;

        let latency = match self.latency.measure(&probes.latency, cancel).await {
            Ok(latency) => {
                info!(latency_ms = latency.as_millis() as u64, "latency measured");
                Some(latency)
            }
            Err(err) => {
                warn!(error = %err, "latency unavailable");
                None
            }
        };

        self.sink
            .announce(TestUpdate::LatencyComplete(latency))
            .await;
        latency
    }

    async fn throughput_phase(
        &self,
        direction: Direction,
        probe: &Probe,
        cancel: &CancellationToken,
    ) -> f64 {
        let phase = match direction {
            Direction::Download => TestPhase::Download,
            Direction::Upload => TestPhase::Upload,
        };
        self.sink.announce(TestUpdate::PhaseStarted(phase)).await;

        if probe.url.is_empty() || cancel.is_cancelled() {
            warn!(direction = direction.label(), "phase skipped");
            return 0.0;
        }

        let bits_per_second = self
            .measurer
            .measure(
                direction,
                &probe.url,
                self.settings.concurrency,
                self.settings.window,
                cancel,
            )
            .await;
        bits_per_second / 1_000_000.0
    }
}
