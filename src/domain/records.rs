// ============================================================
// Layer 3 — Dataset Row Types
// ============================================================
// Row schemas for the generated CSV files and the EDA metrics
// attached during enrichment. Field names are the CSV column
// names, so serde (via the csv crate) handles both directions.

use serde::{Deserialize, Serialize};

/// One synthetic engineer note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignNote {
    pub note_id:            String,
    pub note_text:          String,
    pub process_node:       String,
    pub word_count:         usize,
    pub optimization_score: f64,
    pub has_opt_keyword:    u8,
    pub recommendation:     String,
    pub engineer_id:        String,
    pub has_optimization:   u8,
}

/// One synthetic chip telemetry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipRecord {
    pub chip_id:          String,
    pub process_node:     String,
    pub transistor_count: u64,
    pub defect_type:      String,
    pub defect_rate:      f64,
    pub yield_status:     String,
    pub power_efficiency: f64,
    pub fabrication_time: u32,
    pub has_defect:       u8,
}

/// Power / area / timing estimates returned by the EDA validator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EdaMetrics {
    #[serde(default)]
    pub power:  f32,
    #[serde(default)]
    pub area:   f32,
    #[serde(default)]
    pub timing: f32,
}

impl EdaMetrics {
    /// Value substituted whenever the remote call fails.
    pub const fn fallback() -> Self {
        Self { power: 0.0, area: 0.0, timing: 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_missing_fields_default_to_zero() {
        let m: EdaMetrics = serde_json::from_str(r#"{"power": 1.5}"#).unwrap();
        assert_eq!(m, EdaMetrics { power: 1.5, area: 0.0, timing: 0.0 });
    }

    #[test]
    fn test_fallback_is_all_zero() {
        assert_eq!(EdaMetrics::fallback(), EdaMetrics::default());
    }
}
