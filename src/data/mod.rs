// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a CSV on disk and tensor batches:
//
//   notes CSV
//       │
//       ▼
//   CsvCorpusLoader   → texts + labels (DataUnavailable on bad input)
//       │
//       ▼
//   TokenizerAdapter  → padded token ids + attention masks
//       │
//       ▼
//   NoteDataset       → implements Burn's Dataset trait
//       │
//       ▼
//   EpochPlan         → seeded, full-coverage batch order per epoch
//       │
//       ▼
//   NoteBatcher       → stacks samples into tensors
//
// Plus the producers that create the CSVs in the first place:
//   synth  — seeded note / chip generators
//   tfidf  — lexical feature block
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the labelled notes CSV
pub mod loader;

/// Pretrained-vocabulary tokenization with a recorded padding policy
pub mod tokenize;

/// Implements Burn's Dataset trait for tokenized notes
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded per-epoch batch order
pub mod sampler;

/// Optional seeded validation hold-out
pub mod splitter;

/// Synthetic design-note and chip generators
pub mod synth;

/// TF-IDF feature extraction
pub mod tfidf;
