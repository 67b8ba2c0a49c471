/// A camera frame with capture metadata.
///
/// The payload is the JPEG exactly as the camera sent it; decoding happens
/// only when a frame is saved or previewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub jpeg_data: Vec<u8>,
    pub captured_at_ms: i64,
    /// Per-source sequence number, starting at 0.
    pub seq: u64,
}

impl CapturedFrame {
    pub fn new(jpeg_data: Vec<u8>, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            jpeg_data,
            captured_at_ms,
            seq,
        }
    }

    /// Stamp a freshly received JPEG with the current wall-clock time.
    pub fn now(jpeg_data: Vec<u8>, seq: u64) -> Self {
        Self::new(jpeg_data, chrono::Utc::now().timestamp_millis(), seq)
    }

    pub fn payload_size(&self) -> usize {
        self.jpeg_data.len()
    }

    /// Capture time as an RFC 3339 string, for logs and API responses.
    pub fn captured_at_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}
