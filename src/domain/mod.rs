// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits that name the concepts of the
// pipeline. No burn types, no file I/O, no network calls.
//
//   example    — labelled note + parallel-vector corpus
//   records    — CSV row schemas and EDA metrics
//   signature  — model input signature and padding policy
//   error      — the named failure taxonomy
//   traits     — CorpusSource / DesignValidator seams

pub mod error;

pub mod example;

pub mod records;

pub mod signature;

pub mod traits;
