// ============================================================
// Layer 4 — TF-IDF Feature Extractor
// ============================================================
// Pure function: corpus of note texts → dense feature block.
//
//   1. lowercase, tokens = runs of 2+ word characters
//   2. drop English stop words
//   3. keep the `max_features` most frequent terms (corpus-wide
//      counts, ties broken alphabetically), columns sorted a→z
//   4. weight = raw term count × smooth idf
//        idf(t) = ln((1 + n) / (1 + df(t))) + 1
//   5. L2-normalise every row (all-zero rows stay zero)
//
// Columns are exposed as tfidf_0 .. tfidf_{k-1}; the vocabulary
// is returned alongside so callers can label them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub struct TfidfBlock {
    /// Column terms, alphabetical. `vocabulary[i]` is column `tfidf_{i}`.
    pub vocabulary: Vec<String>,
    /// One row per document, `vocabulary.len()` values each.
    pub rows:       Vec<Vec<f64>>,
}

impl TfidfBlock {
    pub fn column_names(&self) -> Vec<String> {
        (0..self.vocabulary.len()).map(|i| format!("tfidf_{i}")).collect()
    }
}

pub struct TfidfVectorizer {
    max_features: usize,
}

impl TfidfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self { max_features }
    }

    pub fn fit_transform<S: AsRef<str>>(&self, docs: &[S]) -> TfidfBlock {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| analyze(d.as_ref())).collect();

        // Corpus-wide term frequency and document frequency
        let mut tf_total: HashMap<&str, usize> = HashMap::new();
        let mut df: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen = HashSet::new();
            for t in tokens {
                *tf_total.entry(t.as_str()).or_insert(0) += 1;
                if seen.insert(t.as_str()) {
                    *df.entry(t.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = tf_total.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut vocabulary: Vec<String> = ranked.iter().map(|(t, _)| t.to_string()).collect();
        vocabulary.sort();
        let column: HashMap<&str, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let n = docs.len() as f64;
        let idf: Vec<f64> = vocabulary
            .iter()
            .map(|t| {
                let d = df.get(t.as_str()).copied().unwrap_or(0) as f64;
                ((1.0 + n) / (1.0 + d)).ln() + 1.0
            })
            .collect();

        let rows = tokenized
            .iter()
            .map(|tokens| {
                let mut row = vec![0.0f64; vocabulary.len()];
                for t in tokens {
                    if let Some(&c) = column.get(t.as_str()) {
                        row[c] += 1.0;
                    }
                }
                for (v, w) in row.iter_mut().zip(&idf) {
                    *v *= w;
                }
                let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.iter_mut().for_each(|v| *v /= norm);
                }
                row
            })
            .collect();

        tracing::debug!("TF-IDF: {} docs, {} features", docs.len(), vocabulary.len());
        TfidfBlock { vocabulary, rows }
    }
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new(50)
    }
}

fn analyze(doc: &str) -> Vec<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("static token pattern"));
    let stop = stop_words();
    let lower = doc.to_lowercase();
    token
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| !stop.contains(t))
        .map(str::to_string)
        .collect()
}

fn stop_words() -> &'static HashSet<&'static str> {
    static STOP: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOP.get_or_init(|| ENGLISH_STOP_WORDS.iter().copied().collect())
}

/// Frequency map, handy for inspection in logs and tests.
pub fn term_counts(doc: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for t in analyze(doc) {
        *counts.entry(t).or_insert(0) += 1;
    }
    counts
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all",
    "almost", "alone", "along", "already", "also", "although", "always", "am", "among",
    "amongst", "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone",
    "anything", "anyway", "anywhere", "are", "around", "as", "at", "back", "be", "became",
    "because", "become", "becomes", "becoming", "been", "before", "beforehand", "behind",
    "being", "below", "beside", "besides", "between", "beyond", "bill", "both", "bottom",
    "but", "by", "call", "can", "cannot", "cant", "co", "con", "could", "couldnt", "cry",
    "de", "describe", "detail", "do", "done", "down", "due", "during", "each", "eg",
    "eight", "either", "eleven", "else", "elsewhere", "empty", "enough", "etc", "even",
    "ever", "every", "everyone", "everything", "everywhere", "except", "few", "fifteen",
    "fifty", "fill", "find", "fire", "first", "five", "for", "former", "formerly", "forty",
    "found", "four", "from", "front", "full", "further", "get", "give", "go", "had", "has",
    "hasnt", "have", "he", "hence", "her", "here", "hereafter", "hereby", "herein",
    "hereupon", "hers", "herself", "him", "himself", "his", "how", "however", "hundred",
    "i", "ie", "if", "in", "inc", "indeed", "interest", "into", "is", "it", "its", "itself",
    "keep", "last", "latter", "latterly", "least", "less", "ltd", "made", "many", "may",
    "me", "meanwhile", "might", "mill", "mine", "more", "moreover", "most", "mostly",
    "move", "much", "must", "my", "myself", "name", "namely", "neither", "never",
    "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
    "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own",
    "part", "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem",
    "seemed", "seeming", "seems", "serious", "several", "she", "should", "show", "side",
    "since", "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something",
    "sometime", "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than",
    "that", "the", "their", "them", "themselves", "then", "thence", "there", "thereafter",
    "thereby", "therefore", "therein", "thereupon", "these", "they", "thick", "thin",
    "third", "this", "those", "though", "three", "through", "throughout", "thru", "thus",
    "to", "together", "too", "top", "toward", "towards", "twelve", "twenty", "two", "un",
    "under", "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were",
    "what", "whatever", "when", "whence", "whenever", "where", "whereafter", "whereas",
    "whereby", "wherein", "whereupon", "wherever", "whether", "which", "while", "whither",
    "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within", "without",
    "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_and_short_tokens_dropped() {
        let counts = term_counts("Optimize the etching for a 5nm process.");
        assert!(!counts.contains_key("the"));
        assert!(!counts.contains_key("for"));
        assert!(counts.contains_key("5nm"));
        assert!(counts.contains_key("etching"));
    }

    #[test]
    fn test_rows_are_unit_length() {
        let docs = [
            "Optimize transistor density for 5nm process.",
            "Maintain current design for 7nm process.",
            "Review current design for 10nm process.",
        ];
        let block = TfidfVectorizer::default().fit_transform(&docs);
        assert_eq!(block.rows.len(), 3);
        for row in &block.rows {
            let norm: f64 = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_vocabulary_sorted_and_capped() {
        let docs = ["design design process", "process current design", "density"];
        let block = TfidfVectorizer::new(2).fit_transform(&docs);
        assert_eq!(block.vocabulary, vec!["design", "process"]);
        assert_eq!(block.column_names(), vec!["tfidf_0", "tfidf_1"]);
        // third doc has neither kept term
        assert!(block.rows[2].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rarer_term_weighs_more() {
        let docs = ["process density", "process", "process"];
        let block = TfidfVectorizer::default().fit_transform(&docs);
        let density = block.vocabulary.iter().position(|t| t == "density").unwrap();
        let process = block.vocabulary.iter().position(|t| t == "process").unwrap();
        assert!(block.rows[0][density] > block.rows[0][process]);
    }
}
