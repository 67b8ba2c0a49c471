use image::DynamicImage;
use snapshot_bucket_common::frame::CapturedFrame;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::naming::{parse_snapshot_index, snapshot_file_name, MAX_INDEX};
use crate::transform::{self, FrameTransform};

const DEFAULT_JPEG_QUALITY: u8 = 90;

/// An existing snapshot file found in the store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub index: u64,
    pub path: PathBuf,
}

impl SnapshotEntry {
    pub fn file_name(&self) -> String {
        snapshot_file_name(self.index)
    }
}

/// Directory of sequentially numbered JPEG snapshots.
///
/// Numbering resumes after the highest `NNNNNNNN.jpg` already present, and the
/// counter only advances once a file has been written completely. The store
/// holds no lock; callers sharing one across threads must serialize `save`.
#[derive(Debug)]
pub struct SnapshotStore {
    directory: PathBuf,
    next_index: u64,
    jpeg_quality: u8,
}

impl SnapshotStore {
    /// Open a store on `directory`, creating it (and any parents) if missing.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_quality(directory, DEFAULT_JPEG_QUALITY)
    }

    pub fn open_with_quality(
        directory: impl Into<PathBuf>,
        jpeg_quality: u8,
    ) -> Result<Self, StoreError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| StoreError::CreateDir {
            path: directory.clone(),
            source: e,
        })?;

        let existing = scan(&directory)?;
        let next_index = existing.last().map_or(1, |entry| entry.index + 1);

        info!(
            directory = directory.display().to_string(),
            existing = existing.len(),
            next_index,
            "snapshot store opened"
        );

        Ok(Self {
            directory,
            next_index,
            jpeg_quality,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Index the next successful save will use.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Encode `image` as JPEG and write it under the next sequence number.
    ///
    /// The bytes go to a hidden `.NNNNNNNN.jpg.part` file first and are renamed
    /// into place, so a failed save never leaves a truncated snapshot behind.
    /// On any error the counter is left unchanged.
    pub fn save(&mut self, image: &DynamicImage) -> Result<PathBuf, StoreError> {
        if self.next_index > MAX_INDEX {
            return Err(StoreError::SequenceExhausted(MAX_INDEX));
        }

        let name = snapshot_file_name(self.next_index);
        let path = self.directory.join(&name);
        let bytes =
            transform::encode_jpeg(image, self.jpeg_quality).map_err(StoreError::Encode)?;

        let part = self.directory.join(format!(".{name}.part"));
        if let Err(e) = fs::write(&part, &bytes).and_then(|()| fs::rename(&part, &path)) {
            if let Err(cleanup) = fs::remove_file(&part) {
                debug!(path = part.display().to_string(), error = %cleanup, "no partial file to remove");
            }
            warn!(path = path.display().to_string(), error = %e, "failed to write snapshot");
            return Err(StoreError::Write { path, source: e });
        }

        info!(
            path = path.display().to_string(),
            index = self.next_index,
            bytes = bytes.len(),
            "snapshot saved"
        );
        self.next_index += 1;
        Ok(path)
    }

    /// Decode a captured frame, apply `adjust`, and save it.
    pub fn save_frame(
        &mut self,
        frame: &CapturedFrame,
        adjust: &FrameTransform,
    ) -> Result<PathBuf, StoreError> {
        let image = transform::decode(&frame.jpeg_data).map_err(StoreError::Decode)?;
        debug!(seq = frame.seq, captured_at = frame.captured_at_rfc3339(), "saving frame");
        self.save(&adjust.apply(image))
    }

    /// All snapshots currently in the directory, in index order.
    pub fn list(&self) -> Result<Vec<SnapshotEntry>, StoreError> {
        scan(&self.directory)
    }
}

/// Collect every entry named like a snapshot, sorted by index.
fn scan(directory: &Path) -> Result<Vec<SnapshotEntry>, StoreError> {
    let read_err = |e: std::io::Error| StoreError::ReadDir {
        path: directory.to_path_buf(),
        source: e,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(directory).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            debug!(name = ?file_name, "skipping non-UTF-8 file name");
            continue;
        };
        match parse_snapshot_index(name) {
            Some(index) => entries.push(SnapshotEntry {
                index,
                path: entry.path(),
            }),
            None => debug!(name, "skipping entry that is not a snapshot"),
        }
    }

    entries.sort_by_key(|e| e.index);
    Ok(entries)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create snapshot directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read snapshot directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write snapshot {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode frame: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] image::ImageError),
    #[error("snapshot sequence exhausted at {0}")]
    SequenceExhausted(u64),
}
