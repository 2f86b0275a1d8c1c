use super::worker::{Cycle, Transfer};
use super::Direction;
use crate::error::Result;
use crate::settings::ROOT_REFERER;
use futures::StreamExt;
use reqwest::header::REFERER;

/// One GET against the probe, counting the body as it arrives and throwing it away.
pub(super) async fn fetch_once(transfer: &Transfer) -> Result<Cycle> {
    let response = transfer
        .client
        .get(&transfer.url)
        .header(REFERER, ROOT_REFERER)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Ok(Cycle::Rejected(status));
    }

    let mut stream = response.bytes_stream();
    let mut moved: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let n = chunk.len() as u64;
        moved += n;
        let total = transfer.counter.add(n);
        transfer.sink.progress(total, Direction::Download);
    }

    Ok(Cycle::Completed { bytes: moved })
}
