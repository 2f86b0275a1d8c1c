use super::null_source::NullSource;
use super::worker::{Cycle, Transfer};
use super::Direction;
use crate::error::Result;
use crate::settings::{SITE_ORIGIN, SITE_REFERER};
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, ORIGIN, REFERER};

/// One POST of `transfer.upload_size` zero bytes. Bytes count as soon as the
/// transport pulls them from the body.
pub(super) async fn push_once(transfer: &Transfer) -> Result<Cycle> {
    let counter = transfer.counter.clone();
    let sink = transfer.sink.clone();

    let body = NullSource::new(transfer.upload_size)
        .into_stream()
        .inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                let total = counter.add(chunk.len() as u64);
                sink.progress(total, Direction::Upload);
            }
        });

    let response = transfer
        .client
        .post(&transfer.url)
        .header(CONTENT_LENGTH, transfer.upload_size)
        .header(REFERER, SITE_REFERER)
        .header(ORIGIN, SITE_ORIGIN)
        .body(reqwest::Body::wrap_stream(body))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Ok(Cycle::Rejected(status));
    }

    Ok(Cycle::Completed {
        bytes: transfer.upload_size,
    })
}
