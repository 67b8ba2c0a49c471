use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SafetyConfig;

/// One object reported by an external detector for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

/// Which required items were absent from a frame's detections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    /// Labels of the missing items, in configured order.
    pub missing: Vec<String>,
    /// `MISSING: <labels>` when anything is missing.
    pub alert: Option<String>,
}

impl SafetyReport {
    pub fn is_compliant(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare detections against the required items.
///
/// Detections below `min_confidence` do not count as present.
pub fn check(detections: &[Detection], config: &SafetyConfig) -> SafetyReport {
    let present: Vec<&str> = detections
        .iter()
        .filter(|d| d.confidence >= config.min_confidence)
        .map(|d| d.class_name.as_str())
        .collect();

    let missing: Vec<String> = config
        .required
        .iter()
        .filter(|item| !present.contains(&item.class_name.as_str()))
        .map(|item| item.label.clone())
        .collect();

    let alert = if missing.is_empty() {
        None
    } else {
        Some(format!("MISSING: {}", missing.join(", ")))
    };

    debug!(
        detections = detections.len(),
        missing = missing.len(),
        "safety check"
    );

    SafetyReport { missing, alert }
}

fn full_confidence() -> f32 {
    1.0
}
