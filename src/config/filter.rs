//! Job filter rules

use serde::{Deserialize, Serialize};

/// Sentinel the extractor writes into a location for the target region
pub const DEFAULT_REGION_MARKER: &str = "ISRAEL";

/// Business rules applied to validated jobs before persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Locations must contain this marker
    pub region_marker: String,
    /// First code point of the unsupported script
    pub script_range_start: char,
    /// Last code point of the unsupported script (inclusive)
    pub script_range_end: char,
    /// Reject when more than this share of alphabetic characters fall in the script range
    pub max_script_ratio: f64,
    /// Department name meaning "uncategorized", compared case-insensitively
    pub excluded_department: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            region_marker: DEFAULT_REGION_MARKER.to_string(),
            script_range_start: '\u{0590}',
            script_range_end: '\u{05FF}',
            max_script_ratio: 0.1,
            excluded_department: "general".to_string(),
        }
    }
}
