// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   hub.rs             — pretrained bundle resolution
//                        (hf-hub cache or a local directory)
//
//   tokenizer_store.rs — pretrained tokenizer resolution and
//                        persistence next to the weights, so the
//                        vocabulary used in training is the one
//                        used at export and prediction time
//
//   checkpoint.rs      — model.mpk + tokenizer.json pair, plus
//                        classifier config, signature and the
//                        latest-epoch pointer
//
//   metrics.rs         — per-epoch scalar metrics → metrics.csv
//
//   eda_client.rs      — blocking HTTP client for the remote
//                        EDA validator, with retry and backoff
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Pretrained resource resolution
pub mod hub;

/// Tokenizer resolution, saving and loading
pub mod tokenizer_store;

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Remote EDA validator client
pub mod eda_client;
