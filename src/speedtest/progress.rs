use super::TestPhase;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Download => "Download",
            Direction::Upload => "Upload",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub bytes_total: u64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestUpdate {
    PhaseStarted(TestPhase),
    LatencySample(Duration),
    LatencyComplete(Option<Duration>),
    Progress(ProgressSample),
    DownloadComplete { speed_mbps: f64 },
    UploadComplete { speed_mbps: f64 },
}

/// Where a run publishes its updates.
///
/// Publishing never waits: when the receiver falls behind, updates are dropped
/// so transfer workers are not slowed down by whoever is watching.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<TestUpdate>>,
}

impl EventSink {
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TestUpdate>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub fn publish(&self, update: TestUpdate) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(update);
        }
    }

    /// Delivers a phase-level update, waiting for room. Not for the I/O path.
    pub async fn announce(&self, update: TestUpdate) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(update).await;
        }
    }

    pub fn progress(&self, bytes_total: u64, direction: Direction) {
        self.publish(TestUpdate::Progress(ProgressSample {
            bytes_total,
            direction,
        }));
    }
}

const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const MAX_SAMPLES: usize = 200;
const SMOOTHING: f64 = 0.3;

/// Turns running byte totals into a smoothed megabit-per-second rate.
#[derive(Debug, Clone)]
pub struct RateMeter {
    last_at: Option<Instant>,
    last_bytes: u64,
    smoothed: Option<f64>,
    samples: VecDeque<f64>,
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateMeter {
    pub fn new() -> Self {
        Self {
            last_at: None,
            last_bytes: 0,
            smoothed: None,
            samples: VecDeque::with_capacity(MAX_SAMPLES + 1),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feeds a running total observed at `now`. Returns the new smoothed rate
    /// when at least one sample interval has passed since the previous sample.
    pub fn record(&mut self, bytes_total: u64, now: Instant) -> Option<f64> {
        let Some(last_at) = self.last_at else {
            self.last_at = Some(now);
            self.last_bytes = bytes_total;
            return None;
        };

        let interval = now.saturating_duration_since(last_at);
        if interval < SAMPLE_INTERVAL {
            return None;
        }

        let delta = bytes_total.saturating_sub(self.last_bytes);
        let mbps = (delta as f64 * 8.0) / interval.as_secs_f64() / 1_000_000.0;
        let smoothed = match self.smoothed {
            Some(prev) => prev + SMOOTHING * (mbps - prev),
            None => mbps,
        };

        self.smoothed = Some(smoothed);
        self.samples.push_back(smoothed);
        if self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }

        self.last_at = Some(now);
        self.last_bytes = bytes_total;
        Some(smoothed)
    }

    pub fn current_mbps(&self) -> f64 {
        self.smoothed.unwrap_or(0.0)
    }

    /// Smoothed rates, oldest first.
    pub fn samples(&self) -> &VecDeque<f64> {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_only_primes_the_meter() {
        let mut meter = RateMeter::new();
        assert_eq!(meter.record(1_000, Instant::now()), None);
        assert_eq!(meter.current_mbps(), 0.0);
    }

    #[test]
    fn samples_are_rate_limited_and_smoothed() {
        let mut meter = RateMeter::new();
        let t0 = Instant::now();
        meter.record(0, t0);

        // 1_250_000 bytes in 1s is 10 Mbps
        assert_eq!(meter.record(1_250_000, t0 + Duration::from_millis(50)), None);
        let first = meter.record(1_250_000, t0 + Duration::from_secs(1)).unwrap();
        assert!((first - 10.0).abs() < 1e-9);

        // next second moves nothing, smoothed rate decays by the smoothing factor
        let second = meter.record(1_250_000, t0 + Duration::from_secs(2)).unwrap();
        assert!((second - 7.0).abs() < 1e-9);
        assert_eq!(meter.samples().len(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let mut meter = RateMeter::new();
        let t0 = Instant::now();
        meter.record(0, t0);
        for i in 1..=(MAX_SAMPLES as u64 + 50) {
            meter.record(i * 1000, t0 + SAMPLE_INTERVAL * i as u32);
        }
        assert_eq!(meter.samples().len(), MAX_SAMPLES);
    }

    #[test]
    fn full_history_drops_the_oldest_rate() {
        let mut meter = RateMeter::new();
        let t0 = Instant::now();
        meter.record(0, t0);
        // a burst first, then a long steady crawl
        meter.record(1_000_000_000, t0 + SAMPLE_INTERVAL);
        let burst = meter.samples()[0];
        for i in 2..=(MAX_SAMPLES as u32 + 1) {
            meter.record(1_000_000_000, t0 + SAMPLE_INTERVAL * i);
        }

        assert_eq!(meter.samples().len(), MAX_SAMPLES);
        assert!(meter.samples().iter().all(|&rate| rate < burst));
    }

    #[tokio::test]
    async fn full_sink_drops_instead_of_blocking() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.progress(1, Direction::Download);
        sink.progress(2, Direction::Download);

        assert_eq!(
            rx.recv().await,
            Some(TestUpdate::Progress(ProgressSample {
                bytes_total: 1,
                direction: Direction::Download,
            }))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn detached_sink_accepts_updates() {
        EventSink::none().publish(TestUpdate::PhaseStarted(TestPhase::Ping));
    }
}
