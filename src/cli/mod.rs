// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap, hands a config to the matching use case, prints the
// result. Nothing is computed here.
//
//   generate-text   → data/text_notes/design_text_data.csv
//   generate-chips  → data/tabular/chip_design_data.csv
//   features        → + tfidf_* columns
//   enrich          → + eda_* columns
//   train           → checkpoint + portable artifact
//   export          → artifact from the checkpoint alone
//   predict         → label + probabilities from the artifact
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EnrichArgs, ExportArgs, FeaturesArgs, GenerateArgs, PredictArgs, TrainArgs};

use crate::application::generate_use_case::DatasetKind;

#[derive(Parser, Debug)]
#[command(
    name = "chip-design-llm",
    version,
    about = "Synthesize chip-design notes, fine-tune a DistilBERT classifier and export it for on-device use."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case for the chosen subcommand.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::GenerateText(args)  => run_generate(args, DatasetKind::Notes),
            Commands::GenerateChips(args) => run_generate(args, DatasetKind::Chips),
            Commands::Features(args)      => run_features(args),
            Commands::Enrich(args)        => run_enrich(args),
            Commands::Train(args)         => run_train(args),
            Commands::Export(args)        => run_export(args),
            Commands::Predict(args)       => run_predict(args),
        }
    }
}

fn run_generate(args: GenerateArgs, kind: DatasetKind) -> Result<()> {
    use crate::application::generate_use_case::GenerateUseCase;

    let cfg = args.into_config(kind);
    let output = cfg.output.clone();
    let rows = GenerateUseCase::new(cfg).execute()?;
    println!("Generated {rows} rows → {output}");
    Ok(())
}

fn run_features(args: FeaturesArgs) -> Result<()> {
    use crate::application::features_use_case::FeaturesUseCase;

    let output = args.output.clone();
    let vocabulary = FeaturesUseCase::new(args.into()).execute()?;
    println!("Wrote {} TF-IDF features → {output}", vocabulary.len());
    for (i, term) in vocabulary.iter().enumerate() {
        println!("  tfidf_{i:<3} {term}");
    }
    Ok(())
}

fn run_enrich(args: EnrichArgs) -> Result<()> {
    use crate::application::enrich_use_case::EnrichUseCase;

    let output = args.output.clone();
    let report = EnrichUseCase::new(args.into()).execute()?;
    println!(
        "Enriched {} rows ({} with fallback metrics) → {output}",
        report.rows, report.fallbacks
    );
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.data);
    let outcome = TrainUseCase::new(args.into()).execute()?;

    match outcome.artifact {
        Some(report) => println!(
            "Training complete after {} epochs. Artifact: {} ({} ops, {} tensors)",
            outcome.state.epoch, report.path.display(), report.nodes, report.params
        ),
        None => println!("Training stopped after epoch {}; no artifact exported.", outcome.state.epoch),
    }
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    use crate::application::export_use_case::ExportUseCase;

    let report = ExportUseCase::new(args.into()).execute()?;
    println!("Exported {} ({} ops, {} tensors)", report.path.display(), report.nodes, report.params);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::{PredictConfig, PredictUseCase};

    let cfg: PredictConfig = args.into();
    let predictor = PredictUseCase::new(&cfg.artifact_path)?;
    for p in predictor.predict_all(&cfg.texts)? {
        let probs: Vec<String> = p
            .classification
            .probabilities
            .iter()
            .map(|(label, prob)| format!("{label}={prob:.4}"))
            .collect();
        println!("{}\t[{}]\t{}", p.classification.label, probs.join(", "), p.text);
    }
    Ok(())
}
