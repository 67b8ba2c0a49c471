pub mod naming;
pub mod store;
pub mod transform;

pub use crate::naming::{parse_snapshot_index, snapshot_file_name};
pub use crate::store::{SnapshotEntry, SnapshotStore, StoreError};
pub use crate::transform::FrameTransform;
