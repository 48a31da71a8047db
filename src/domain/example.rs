// ============================================================
// Layer 3 — Labelled Example / Corpus
// ============================================================
// One labelled design note: the free text written by an
// engineer and whether it calls for an optimisation (1) or
// not (0). Examples are immutable once loaded.
//
// A Corpus keeps texts and labels as two parallel vectors,
// which is the shape the tokenizer wants (one batch call over
// all texts) and the shape the loader naturally produces.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub text:  String,
    pub label: u8,
}

impl Example {
    pub fn new(text: impl Into<String>, label: u8) -> Self {
        Self { text: text.into(), label }
    }
}

/// Parallel texts / labels. `texts.len() == labels.len()` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    texts:  Vec<String>,
    labels: Vec<u8>,
}

impl Corpus {
    pub fn from_examples(examples: impl IntoIterator<Item = Example>) -> Self {
        let (texts, labels) = examples
            .into_iter()
            .map(|e| (e.text, e.label))
            .unzip();
        Self { texts, labels }
    }

    pub fn texts(&self) -> &[String] { &self.texts }

    pub fn labels(&self) -> &[u8] { &self.labels }

    pub fn len(&self) -> usize { self.texts.len() }

    /// Count of examples per label, indexed by label value.
    pub fn label_counts(&self, num_labels: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_labels];
        for &l in &self.labels {
            if let Some(c) = counts.get_mut(l as usize) {
                *c += 1;
            }
        }
        counts
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.texts.iter().map(String::as_str).zip(self.labels.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_keeps_order_and_pairs() {
        let corpus = Corpus::from_examples(vec![
            Example::new("Optimize transistor density for 5nm process.", 1),
            Example::new("Maintain current design for 7nm process.", 0),
        ]);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.labels(), &[1, 0]);
        let first = corpus.iter().next();
        assert_eq!(first, Some(("Optimize transistor density for 5nm process.", 1)));
    }

    #[test]
    fn test_label_counts() {
        let corpus = Corpus::from_examples(vec![
            Example::new("a", 1), Example::new("b", 0), Example::new("c", 1),
        ]);
        assert_eq!(corpus.label_counts(2), vec![1, 2]);
    }
}
