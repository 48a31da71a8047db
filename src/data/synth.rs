// ============================================================
// Layer 4 — Synthetic Dataset Generators
// ============================================================
// Two generators, both driven by an explicit seed so the same
// (seed, count) always yields byte-identical CSV output:
//
//   NoteGenerator  — engineer design notes with a binary
//                    has_optimization label (training corpus)
//   ChipGenerator  — chip telemetry rows with a has_defect label
//
// Note templates:
//   optimisation  "{Action} {target} for {node} process."
//                 action ∈ reduce/optimize/adjust/improve
//                 score  ~ U(0.7, 1.0)
//   neutral       "{Action} current design for {node} process."
//                 action ∈ review/maintain/standard
//                 score  ~ U(0.0, 0.3)

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::domain::records::{ChipRecord, DesignNote};

pub const PROCESS_NODES: [&str; 4] = ["3nm", "5nm", "7nm", "10nm"];

const OPTIMIZATION_KEYWORDS: [&str; 4] = ["reduce", "optimize", "adjust", "improve"];
const NEUTRAL_KEYWORDS: [&str; 3] = ["review", "maintain", "standard"];
const OPTIMIZATION_TARGETS: [&str; 3] = ["transistor density", "power efficiency", "etching parameters"];
const RECOMMENDATIONS: [&str; 4] = [
    "Adjust doping levels.",
    "Increase layer thickness.",
    "Reduce transistor density.",
    "Optimize etching process.",
];
const NEUTRAL_RECOMMENDATION: &str = "Maintain current design.";

const DEFECT_TYPES: [&str; 4] = ["none", "lithography", "etching", "doping"];
const YIELD_STATUSES: [&str; 3] = ["high", "medium", "low"];

// ─── Design notes ─────────────────────────────────────────────────────────────
pub struct NoteGenerator {
    rng: StdRng,
}

impl NoteGenerator {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn generate(&mut self, count: usize) -> Vec<DesignNote> {
        (0..count)
            .map(|_| {
                let has_optimization = self.rng.gen_bool(0.5);
                self.note(has_optimization)
            })
            .collect()
    }

    fn note(&mut self, has_optimization: bool) -> DesignNote {
        let rng = &mut self.rng;
        let process_node = pick(rng, &PROCESS_NODES);

        let (note_text, optimization_score, recommendation) = if has_optimization {
            let action = pick(rng, &OPTIMIZATION_KEYWORDS);
            let target = pick(rng, &OPTIMIZATION_TARGETS);
            (
                format!("{} {target} for {process_node} process.", capitalize(action)),
                rng.gen_range(0.7..1.0),
                pick(rng, &RECOMMENDATIONS).to_string(),
            )
        } else {
            let action = pick(rng, &NEUTRAL_KEYWORDS);
            (
                format!("{} current design for {process_node} process.", capitalize(action)),
                rng.gen_range(0.0..0.3),
                NEUTRAL_RECOMMENDATION.to_string(),
            )
        };

        let note_id     = format!("NOTE_{}", rng.gen_range(1000..=9999));
        let engineer_id = format!("ENG{}", rng.gen_range(1000..=9999));
        let word_count  = note_text.split_whitespace().count();

        DesignNote {
            note_id,
            note_text,
            process_node: process_node.to_string(),
            word_count,
            optimization_score,
            has_opt_keyword: has_optimization as u8,
            recommendation,
            engineer_id,
            has_optimization: has_optimization as u8,
        }
    }
}

// ─── Chip telemetry ───────────────────────────────────────────────────────────
pub struct ChipGenerator {
    rng: StdRng,
}

impl ChipGenerator {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn generate(&mut self, count: usize) -> Vec<ChipRecord> {
        (0..count)
            .map(|_| {
                let has_defect = self.rng.gen_bool(0.5);
                self.record(has_defect)
            })
            .collect()
    }

    fn record(&mut self, has_defect: bool) -> ChipRecord {
        let rng = &mut self.rng;
        let process_node = pick(rng, &PROCESS_NODES).to_string();

        let transistor_count = if has_defect {
            rng.gen_range(500_000..=15_000_000)
        } else {
            rng.gen_range(1_000_000..=10_000_000)
        };
        let defect_type = if has_defect { pick(rng, &DEFECT_TYPES) } else { "none" }.to_string();
        let defect_rate = if has_defect { rng.gen_range(0.01..0.1) } else { 0.0 };
        let yield_status = pick(rng, &YIELD_STATUSES).to_string();
        let power_efficiency = if has_defect {
            rng.gen_range(0.3..1.5)
        } else {
            rng.gen_range(0.5..2.0)
        };
        let fabrication_time = if has_defect {
            rng.gen_range(40..=100)
        } else {
            rng.gen_range(10..=50)
        };

        ChipRecord {
            chip_id: format!("CHIP_{}", rng.gen_range(1000..=9999)),
            process_node,
            transistor_count,
            defect_type,
            defect_rate,
            yield_status,
            power_efficiency,
            fabrication_time,
            has_defect: has_defect as u8,
        }
    }
}

fn pick<'a>(rng: &mut StdRng, options: &[&'a str]) -> &'a str {
    options.choose(rng).copied().unwrap_or_default()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
