// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// One use case per CLI subcommand. Each owns a serde config
// built from the CLI arguments and coordinates the other layers.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Synthetic note / chip datasets
pub mod generate_use_case;

// TF-IDF feature block
pub mod features_use_case;

// EDA enrichment with zero fallback
pub mod enrich_use_case;

// The fine-tuning workflow
pub mod train_use_case;

// Re-export from the checkpoint directory
pub mod export_use_case;

// Classification with an exported artifact
pub mod predict_use_case;
