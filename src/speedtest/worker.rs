use super::counter::ByteCounter;
use super::progress::EventSink;
use super::{download, upload, Direction};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const EMPTY_CYCLE_PAUSE: Duration = Duration::from_millis(200);
const RATE_LIMITED_BACKOFF: Duration = Duration::from_secs(1);
const DOWNLOAD_RETRY_BACKOFF: Duration = Duration::from_millis(200);
const UPLOAD_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Everything the workers of one phase share.
#[derive(Debug)]
pub struct Transfer {
    pub client: reqwest::Client,
    pub url: String,
    pub direction: Direction,
    /// POST body size; ignored for downloads.
    pub upload_size: u64,
    pub counter: ByteCounter,
    pub sink: EventSink,
}

pub(crate) enum Cycle {
    Completed { bytes: u64 },
    Rejected(StatusCode),
}

/// Repeats requests against one URL until the deadline passes, the token is
/// cancelled or the transport fails.
pub struct StreamWorker {
    id: usize,
    transfer: Arc<Transfer>,
    cancel: CancellationToken,
    deadline: Instant,
}

impl StreamWorker {
    pub fn new(
        id: usize,
        transfer: Arc<Transfer>,
        cancel: CancellationToken,
        deadline: Instant,
    ) -> Self {
        Self {
            id,
            transfer,
            cancel,
            deadline,
        }
    }

    pub async fn run(self) {
        loop {
            if self.cancel.is_cancelled() || Instant::now() >= self.deadline {
                return;
            }

            let cycle = tokio::select! {
                _ = self.cancel.cancelled() => return,
                cycle = self.cycle() => cycle,
            };

            let pause = match cycle {
                Ok(Cycle::Completed { bytes }) if bytes > 0 => continue,
                Ok(Cycle::Completed { .. }) => EMPTY_CYCLE_PAUSE,
                Ok(Cycle::Rejected(status)) => {
                    debug!(worker = self.id, %status, url = %self.transfer.url, "probe rejected request");
                    backoff_for(self.transfer.direction, status)
                }
                Err(err) => {
                    debug!(worker = self.id, error = %err, "worker stopped");
                    return;
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    async fn cycle(&self) -> crate::error::Result<Cycle> {
        match self.transfer.direction {
            Direction::Download => download::fetch_once(&self.transfer).await,
            Direction::Upload => upload::push_once(&self.transfer).await,
        }
    }
}

/// How long to wait before retrying after the probe answered with `status`.
pub fn backoff_for(direction: Direction, status: StatusCode) -> Duration {
    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        return RATE_LIMITED_BACKOFF;
    }
    match direction {
        Direction::Download => DOWNLOAD_RETRY_BACKOFF,
        Direction::Upload => UPLOAD_RETRY_BACKOFF,
    }
}
