use bytes::BytesMut;
use futures_util::StreamExt;
use snapshot_bucket_common::frame::CapturedFrame;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::CaptureError;

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
/// Largest part we buffer before giving up on it and resyncing.
const MAX_PART_BYTES: usize = 8 * 1024 * 1024;

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for a `multipart/x-mixed-replace` MJPEG body.
///
/// Feed it arbitrary chunks; boundaries and part headers may straddle chunk
/// edges. A part is only emitted once the boundary after it has arrived.
pub struct MultipartParser {
    buffer: BytesMut,
    state: ParseState,
    /// Offset already scanned for a boundary while collecting a part.
    jpeg_start: usize,
    max_part: usize,
}

impl Default for MultipartParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartParser {
    pub fn new() -> Self {
        Self::with_max_part(MAX_PART_BYTES)
    }

    /// A parser that drops any part (headers included) larger than `max_part`
    /// bytes and skips ahead to the next boundary.
    pub fn with_max_part(max_part: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
            max_part,
        }
    }

    /// Discard an oversized part. Returns true if the buffer was reset.
    fn resync_if_oversized(&mut self) -> bool {
        if self.buffer.len() <= self.max_part {
            return false;
        }
        warn!(
            buffered = self.buffer.len(),
            limit = self.max_part,
            "MJPEG part exceeds size limit, resyncing on next boundary"
        );
        self.buffer.clear();
        self.jpeg_start = 0;
        self.state = ParseState::SeekingBoundary;
        true
    }

    /// Append `chunk` and return every part completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep a tail in case the boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        self.resync_if_oversized();
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY)
                    else {
                        if !self.resync_if_oversized() {
                            self.jpeg_start = self.buffer.len().saturating_sub(BOUNDARY.len());
                        }
                        break;
                    };

                    let jpeg_end = self.jpeg_start + pos;
                    // Strip the CRLF that precedes the boundary
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let jpeg_data = self.buffer[..end].to_vec();
                    let _ = self.buffer.split_to(jpeg_end + BOUNDARY.len());

                    if !jpeg_data.is_empty() {
                        frames.push(jpeg_data);
                    }
                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }

        frames
    }
}

/// Follow the MJPEG stream at `stream_url`, publishing each frame on `tx`.
/// Reconnects with exponential backoff; returns once every receiver is gone.
pub async fn run_mjpeg_source(stream_url: String, tx: watch::Sender<Option<CapturedFrame>>) {
    let client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client for MJPEG source");
            return;
        }
    };

    let mut backoff = Duration::from_secs(2);
    let max_backoff = Duration::from_secs(30);
    let mut seq: u64 = 0;

    loop {
        info!(url = stream_url, "connecting to MJPEG stream");
        match consume_stream(&client, &stream_url, &tx, &mut seq).await {
            Ok(()) => {
                info!("stream ended cleanly, reconnecting");
                backoff = Duration::from_secs(2);
            }
            Err(CaptureError::Closed) => {
                info!("no frame receivers left, stopping MJPEG source");
                return;
            }
            Err(e) => {
                error!(error = %e, "stream error, reconnecting in {:?}", backoff);
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn consume_stream(
    client: &reqwest::Client,
    url: &str,
    tx: &watch::Sender<Option<CapturedFrame>>,
    seq: &mut u64,
) -> Result<(), CaptureError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(CaptureError::HttpConnect)?;

    if !response.status().is_success() {
        return Err(CaptureError::HttpStatus(response.status().as_u16()));
    }

    info!(status = %response.status(), "connected to MJPEG stream");

    let mut byte_stream = response.bytes_stream();
    let mut parser = MultipartParser::new();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(CaptureError::HttpStream)?;
        for jpeg_data in parser.push(&chunk) {
            let frame = CapturedFrame::now(jpeg_data, *seq);
            debug!(seq = frame.seq, bytes = frame.payload_size(), "received MJPEG frame");
            *seq += 1;
            tx.send(Some(frame)).map_err(|_| CaptureError::Closed)?;
        }
    }

    Ok(())
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve_once;

    fn fake_jpeg(tag: u8) -> Vec<u8> {
        vec![0xFF, 0xD8, tag, tag, 0xFF, 0xD9]
    }

    fn multipart_body(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut body = b"preamble junk\r\n".to_vec();
        for jpeg in frames {
            body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
            body.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes());
            body.extend_from_slice(jpeg);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"--frame\r\n");
        body
    }

    #[test]
    fn whole_body_in_one_chunk() {
        let frames = vec![fake_jpeg(1), fake_jpeg(2), fake_jpeg(3)];
        let mut parser = MultipartParser::new();
        assert_eq!(parser.push(&multipart_body(&frames)), frames);
    }

    #[test]
    fn arbitrary_chunk_sizes() {
        let frames = vec![fake_jpeg(7), fake_jpeg(8), fake_jpeg(9)];
        let body = multipart_body(&frames);
        for size in [1, 2, 3, 5, 9, 10, 17] {
            let mut parser = MultipartParser::new();
            let got: Vec<Vec<u8>> = body.chunks(size).flat_map(|c| parser.push(c)).collect();
            assert_eq!(got, frames, "chunk size {size}");
        }
    }

    #[test]
    fn last_part_waits_for_boundary() {
        let mut parser = MultipartParser::new();
        let out = parser.push(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8\x01\xFF\xD9\r\n");
        assert!(out.is_empty());
        let out = parser.push(b"--frame\r\n");
        assert_eq!(out, vec![vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9]]);
    }

    #[test]
    fn oversized_part_is_dropped_and_parser_recovers() {
        let mut parser = MultipartParser::with_max_part(64);
        let out = parser.push(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        assert!(out.is_empty());
        let out = parser.push(&[0xAB; 100]);
        assert!(out.is_empty());
        assert!(parser.buffer.len() <= 64);

        let out = parser.push(&multipart_body(&[fake_jpeg(6)]));
        assert_eq!(out, vec![fake_jpeg(6)]);
    }

    #[test]
    fn headers_without_end_are_bounded() {
        let mut parser = MultipartParser::with_max_part(32);
        parser.push(b"--frame\r\n");
        parser.push(&[b'x'; 40]);
        assert!(parser.buffer.is_empty());
        assert!(matches!(parser.state, ParseState::SeekingBoundary));
    }

    #[test]
    fn empty_parts_are_dropped() {
        let mut parser = MultipartParser::new();
        let out = parser.push(b"--frame\r\nX: y\r\n\r\n\r\n--frame\r\n");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn stream_publishes_frames() {
        let frames = vec![fake_jpeg(4), fake_jpeg(5)];
        let url = serve_once(
            "200 OK",
            "multipart/x-mixed-replace; boundary=frame",
            multipart_body(&frames),
        )
        .await;

        let (tx, mut rx) = watch::channel(None);
        let client = reqwest::Client::new();
        let mut seq = 0;
        consume_stream(&client, &url, &tx, &mut seq).await.unwrap();

        assert_eq!(seq, 2);
        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone().unwrap();
        assert_eq!(latest.jpeg_data, fake_jpeg(5));
        assert_eq!(latest.seq, 1);
    }

    #[tokio::test]
    async fn stream_error_status() {
        let url = serve_once("503 Service Unavailable", "text/plain", b"busy".to_vec()).await;
        let (tx, _rx) = watch::channel(None);
        let mut seq = 0;
        let err = consume_stream(&reqwest::Client::new(), &url, &tx, &mut seq)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::HttpStatus(503)));
    }
}
