// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams where the pipeline talks to the outside world:
//
//   CorpusSource     — anything that yields labelled notes
//                      (CSV file today)
//   DesignValidator  — anything that scores a design note with
//                      power / area / timing estimates
//                      (the remote EDA service today, stubs in tests)
//
// The application layer only sees these traits, so the training
// and enrichment workflows can be exercised without a network
// or a particular file format.

use crate::domain::error::PipelineError;
use crate::domain::example::Corpus;
use crate::domain::records::EdaMetrics;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
pub trait CorpusSource {
    /// Load every labelled example, or fail with `DataUnavailable`.
    fn load_corpus(&self) -> Result<Corpus, PipelineError>;
}

// ─── DesignValidator ──────────────────────────────────────────────────────────
pub trait DesignValidator {
    /// Validate one note / recommendation pair.
    /// Errors are always `RemoteUnavailable`; callers decide the fallback.
    fn validate(&self, note_text: &str, recommendation: &str)
        -> Result<EdaMetrics, PipelineError>;
}
