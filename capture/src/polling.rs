use snapshot_bucket_common::frame::CapturedFrame;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::CaptureError;

/// Fetch a single JPEG from the camera's frame endpoint.
pub async fn fetch_frame(
    client: &reqwest::Client,
    frame_url: &str,
    seq: u64,
) -> Result<CapturedFrame, CaptureError> {
    let resp = client
        .get(frame_url)
        .send()
        .await
        .map_err(CaptureError::HttpConnect)?;

    if !resp.status().is_success() {
        return Err(CaptureError::HttpStatus(resp.status().as_u16()));
    }

    let jpeg_data = resp.bytes().await.map_err(CaptureError::HttpStream)?.to_vec();
    if jpeg_data.is_empty() {
        return Err(CaptureError::EmptyFrame);
    }

    let frame = CapturedFrame::now(jpeg_data, seq);
    debug!(seq, bytes = frame.payload_size(), "fetched frame");
    Ok(frame)
}

/// Polling-based source: fetch one frame per `interval` and publish it on `tx`.
/// Failed fetches are logged and retried on the next tick.
pub async fn run_polling_source(
    frame_url: String,
    interval: Duration,
    tx: watch::Sender<Option<CapturedFrame>>,
) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);
    let mut seq: u64 = 0;

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            debug!("no frame receivers left, stopping polling source");
            return;
        }

        match fetch_frame(&client, &frame_url, seq).await {
            Ok(frame) => {
                seq += 1;
                if tx.send(Some(frame)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, url = frame_url, "failed to fetch camera frame");
            }
        }
    }
}
