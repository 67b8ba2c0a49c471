pub mod mjpeg;
pub mod polling;

use snapshot_bucket_common::config::{CaptureConfig, CaptureMode};
use snapshot_bucket_common::frame::CapturedFrame;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("camera returned an empty frame")]
    EmptyFrame,
    #[error("all frame receivers dropped")]
    Closed,
}

/// Handle on the most recent frame published by a capture source.
///
/// Cloning is cheap; every clone observes the same source.
#[derive(Debug, Clone)]
pub struct LatestFrame {
    rx: watch::Receiver<Option<CapturedFrame>>,
}

impl LatestFrame {
    /// A publisher for capture sources and the matching handle.
    pub fn channel() -> (watch::Sender<Option<CapturedFrame>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// The newest frame, or `None` before the source delivered anything.
    pub fn current(&self) -> Option<CapturedFrame> {
        self.rx.borrow().clone()
    }

    /// Wait up to `timeout` for a frame published after the last one this
    /// handle returned from `next`.
    pub async fn next(&mut self, timeout: Duration) -> Option<CapturedFrame> {
        tokio::time::timeout(timeout, self.rx.changed())
            .await
            .ok()?
            .ok()?;
        self.rx.borrow_and_update().clone()
    }
}

/// Start the configured capture source on the current tokio runtime.
pub fn spawn_source(config: &CaptureConfig) -> LatestFrame {
    let (tx, latest) = LatestFrame::channel();
    let url = config.source_url();

    match config.mode {
        CaptureMode::Mjpeg => {
            info!(url, "starting MJPEG capture source");
            tokio::spawn(mjpeg::run_mjpeg_source(url, tx));
        }
        CaptureMode::Polling => {
            let interval = Duration::from_secs_f64(1.0 / config.fps.max(0.01))
                .max(Duration::from_millis(1));
            info!(url, ?interval, "starting polling capture source");
            tokio::spawn(polling::run_polling_source(url, interval, tx));
        }
    }

    latest
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_is_none_until_published() {
        let (tx, latest) = LatestFrame::channel();
        assert!(latest.current().is_none());
        tx.send(Some(CapturedFrame::new(vec![1], 10, 0))).unwrap();
        assert_eq!(latest.current().unwrap().captured_at_ms, 10);
    }

    #[tokio::test]
    async fn next_times_out_without_frames() {
        let (_tx, mut latest) = LatestFrame::channel();
        assert!(latest.next(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn next_only_returns_new_frames() {
        let (tx, mut latest) = LatestFrame::channel();
        tx.send(Some(CapturedFrame::new(vec![1], 1, 0))).unwrap();
        assert_eq!(latest.next(Duration::from_millis(50)).await.unwrap().seq, 0);
        assert!(latest.next(Duration::from_millis(20)).await.is_none());

        tx.send(Some(CapturedFrame::new(vec![2], 2, 1))).unwrap();
        assert_eq!(latest.next(Duration::from_millis(50)).await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn next_ends_when_source_stops() {
        let (tx, mut latest) = LatestFrame::channel();
        drop(tx);
        assert!(latest.next(Duration::from_secs(1)).await.is_none());
    }
}
