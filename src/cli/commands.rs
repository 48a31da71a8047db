// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// The seven subcommands and their flags. Every *Args converts
// into the matching application config through `From`, so the
// application layer never sees clap types.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    enrich_use_case::EnrichConfig,
    export_use_case::{ExportConfig, DEFAULT_SAMPLE_TEXT},
    features_use_case::FeaturesConfig,
    generate_use_case::{GenerateConfig, DatasetKind, DEFAULT_CHIPS_PATH, DEFAULT_NOTES_PATH},
    predict_use_case::PredictConfig,
    train_use_case::{CheckpointPolicy, TrainConfig},
};
use crate::domain::signature::PaddingPolicy;
use crate::infra::{eda_client::{RetryConfig, DEFAULT_ENDPOINT}, hub::DEFAULT_BASE_MODEL};
use crate::ml::BackendKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the synthetic design-notes dataset
    GenerateText(GenerateArgs),

    /// Generate the synthetic chip telemetry dataset
    GenerateChips(GenerateArgs),

    /// Append TF-IDF features to a notes CSV
    Features(FeaturesArgs),

    /// Append EDA power / area / timing metrics to a notes CSV
    Enrich(EnrichArgs),

    /// Fine-tune the classifier and export the portable artifact
    Train(TrainArgs),

    /// Re-export the artifact from a saved checkpoint
    Export(ExportArgs),

    /// Classify text with an exported artifact
    Predict(PredictArgs),
}

// ─── Shared value enums ───────────────────────────────────────────────────────
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BackendArg {
    Wgpu,
    Cpu,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu => BackendKind::Wgpu,
            BackendArg::Cpu  => BackendKind::Cpu,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PaddingArg {
    /// Pad to the longest row of each call
    Longest,
    /// Pad or truncate every row to --max-length
    Fixed,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum CheckpointArg {
    PerEpoch,
    None,
}

// ─── generate-text / generate-chips ──────────────────────────────────────────
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Output CSV (defaults depend on the dataset)
    #[arg(long)]
    pub output: Option<String>,

    #[arg(long, default_value_t = 10_000)]
    pub samples: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl GenerateArgs {
    pub fn into_config(self, kind: DatasetKind) -> GenerateConfig {
        let default_path = match kind {
            DatasetKind::Notes => DEFAULT_NOTES_PATH,
            DatasetKind::Chips => DEFAULT_CHIPS_PATH,
        };
        GenerateConfig {
            kind,
            output:  self.output.unwrap_or_else(|| default_path.to_string()),
            samples: self.samples,
            seed:    self.seed,
        }
    }
}

// ─── features ────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct FeaturesArgs {
    #[arg(long, default_value = DEFAULT_NOTES_PATH)]
    pub input: String,

    #[arg(long, default_value = "data/text_notes/processed_design_text_data.csv")]
    pub output: String,

    /// Vocabulary size of the feature block
    #[arg(long, default_value_t = 50)]
    pub max_features: usize,
}

impl From<FeaturesArgs> for FeaturesConfig {
    fn from(a: FeaturesArgs) -> Self {
        FeaturesConfig { input: a.input, output: a.output, max_features: a.max_features }
    }
}

// ─── enrich ──────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct EnrichArgs {
    #[arg(long, default_value = DEFAULT_NOTES_PATH)]
    pub input: String,

    #[arg(long, default_value = "data/text_notes/eda_validated_data.csv")]
    pub output: String,

    /// Validator URL; the bearer token is read from EDA_API_KEY
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per record before falling back to zero metrics
    #[arg(long, default_value_t = 3)]
    pub max_attempts: usize,
}

impl From<EnrichArgs> for EnrichConfig {
    fn from(a: EnrichArgs) -> Self {
        EnrichConfig {
            input:        a.input,
            output:       a.output,
            endpoint:     a.endpoint,
            timeout_secs: a.timeout_secs,
            retry:        RetryConfig { max_attempts: a.max_attempts.max(1), ..RetryConfig::default() },
        }
    }
}

// ─── train ───────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Labelled notes CSV (needs note_text and has_optimization)
    #[arg(long, default_value = DEFAULT_NOTES_PATH)]
    pub data: String,

    /// Hub id or local directory with config.json, tokenizer.json, model.safetensors
    #[arg(long, default_value = DEFAULT_BASE_MODEL)]
    pub base_model: String,

    #[arg(long, default_value = "models/distilbert_finetuned")]
    pub checkpoint_dir: String,

    /// Where metrics.csv is written
    #[arg(long, default_value = "models/distilbert_finetuned/logs")]
    pub log_dir: String,

    #[arg(long, default_value = "models/chip_design_llm.safetensors")]
    pub artifact: String,

    #[arg(long, default_value_t = 3)]
    pub epochs: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 5e-5)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fraction held out for per-epoch validation
    #[arg(long, default_value_t = 0.0)]
    pub val_fraction: f64,

    #[arg(long, value_enum, default_value = "per-epoch")]
    pub checkpoint_policy: CheckpointArg,

    /// Keep every epoch in its own epoch_{n}/ directory
    #[arg(long)]
    pub versioned_checkpoints: bool,

    #[arg(long, value_enum, default_value = "longest")]
    pub padding: PaddingArg,

    /// Truncation length (Longest) or exact length (Fixed)
    #[arg(long, default_value_t = 512)]
    pub max_length: usize,

    /// Text traced when exporting
    #[arg(long, default_value = DEFAULT_SAMPLE_TEXT)]
    pub sample_text: String,

    #[arg(long, value_enum, default_value = "wgpu")]
    pub backend: BackendArg,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let padding = match a.padding {
            PaddingArg::Longest => PaddingPolicy::Longest { max_length: a.max_length },
            PaddingArg::Fixed   => PaddingPolicy::Fixed { length: a.max_length },
        };
        let checkpoint_policy = match a.checkpoint_policy {
            CheckpointArg::PerEpoch => CheckpointPolicy::PerEpoch,
            CheckpointArg::None     => CheckpointPolicy::None,
        };
        TrainConfig {
            data_path:             a.data,
            checkpoint_dir:        a.checkpoint_dir,
            log_dir:               a.log_dir,
            artifact_path:         a.artifact,
            base_model:            a.base_model,
            epochs:                a.epochs,
            batch_size:            a.batch_size,
            learning_rate:         a.lr,
            weight_decay:          a.weight_decay,
            seed:                  a.seed,
            val_fraction:          a.val_fraction,
            checkpoint_policy,
            versioned_checkpoints: a.versioned_checkpoints,
            padding,
            sample_text:           a.sample_text,
            backend:               a.backend.into(),
        }
    }
}

// ─── export ──────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[arg(long, default_value = "models/distilbert_finetuned")]
    pub checkpoint_dir: String,

    #[arg(long, default_value = "models/chip_design_llm.safetensors")]
    pub artifact: String,

    /// Must tokenize to the shape recorded at training time
    #[arg(long, default_value = DEFAULT_SAMPLE_TEXT)]
    pub sample_text: String,

    #[arg(long, value_enum, default_value = "wgpu")]
    pub backend: BackendArg,
}

impl From<ExportArgs> for ExportConfig {
    fn from(a: ExportArgs) -> Self {
        ExportConfig {
            checkpoint_dir: a.checkpoint_dir,
            artifact_path:  a.artifact,
            sample_text:    a.sample_text,
            backend:        a.backend.into(),
        }
    }
}

// ─── predict ─────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct PredictArgs {
    #[arg(long, default_value = "models/chip_design_llm.safetensors")]
    pub artifact: String,

    /// One or more notes to classify
    #[arg(required = true)]
    pub texts: Vec<String>,
}

impl From<PredictArgs> for PredictConfig {
    fn from(a: PredictArgs) -> Self {
        PredictConfig { artifact_path: a.artifact, texts: a.texts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "chip-design-llm", "train", "--epochs", "1", "--batch-size", "2",
            "--padding", "fixed", "--max-length", "16", "--checkpoint-policy", "none", "--backend", "cpu",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.epochs, 1);
        assert_eq!(cfg.padding, PaddingPolicy::Fixed { length: 16 });
        assert_eq!(cfg.checkpoint_policy, CheckpointPolicy::None);
        assert_eq!(cfg.backend, BackendKind::Cpu);
        assert_eq!(cfg.learning_rate, 5e-5);
    }

    #[test]
    fn test_generate_defaults_depend_on_dataset() {
        let cli = Cli::try_parse_from(["chip-design-llm", "generate-chips", "--samples", "5"]).unwrap();
        let Commands::GenerateChips(args) = cli.command else { panic!("expected generate-chips") };
        let cfg = args.into_config(DatasetKind::Chips);
        assert_eq!(cfg.output, DEFAULT_CHIPS_PATH);
        assert_eq!(cfg.samples, 5);
        assert_eq!(cfg.seed, 42);
    }

    #[test]
    fn test_predict_requires_text() {
        assert!(Cli::try_parse_from(["chip-design-llm", "predict"]).is_err());
    }
}
