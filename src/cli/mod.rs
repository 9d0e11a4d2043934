//! PhishGuard CLI Module
//!
//! Command-line interface for training, validation and prediction.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifacts::RunLayout;
use crate::config::PipelineConfig;
use crate::ingestion::DataIngestion;
use crate::pipeline::{DataSource, PipelineState, TrainingPipeline};
use crate::schema::Schema;
use crate::serving::{init_production, PrecomputedFeatures, Verdict, PREDICTED_COLUMN};
use crate::utils::{save_json, DataLoader, DataSaver};
use crate::validation::DataValidation;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(235, 110, 100) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", bad("✗"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "phishguard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Phishing URL classifier training pipeline")]
#[command(long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full training pipeline
    Train {
        /// Raw feature export to split into train and test
        #[arg(short, long, conflicts_with_all = ["train", "test"])]
        data: Option<PathBuf>,

        /// Pre-split train file
        #[arg(long, requires = "test")]
        train: Option<PathBuf>,

        /// Pre-split test file
        #[arg(long, requires = "train")]
        test: Option<PathBuf>,

        /// Override the artifact root
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// Override the minimum test accuracy for promotion
        #[arg(long)]
        expected_accuracy: Option<f64>,

        /// Worker threads for the grid search
        #[arg(short = 'j', long)]
        n_jobs: Option<usize>,

        /// Disable experiment tracking
        #[arg(long)]
        no_tracking: bool,
    },

    /// Check schema conformance and drift between two splits
    Validate {
        /// Reference (train) split
        #[arg(long)]
        train: PathBuf,

        /// Current (test) split
        #[arg(long)]
        test: PathBuf,

        /// Where to write the drift report
        #[arg(short, long, default_value = "validation_report")]
        output: PathBuf,
    },

    /// Label every row of a feature file with the production model
    Predict {
        /// Feature file (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Model file; defaults to the production model
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Output predictions file
        #[arg(short, long, default_value = "prediction_output/output.csv")]
        output: PathBuf,
    },

    /// Score URLs from precomputed feature vectors
    PredictUrl {
        /// Comma- or newline-separated URLs; read from stdin when omitted
        urls: Option<String>,

        /// JSON object mapping each URL to its feature vector
        #[arg(short, long)]
        features: PathBuf,

        /// Model file; defaults to the production model
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// P(phishing) at or above which a URL is labelled phishing
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Write the built-in phishing schema
    Schema {
        /// Output schema file; defaults to the configured schema path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a dataset's schema conformance
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Helpers ───────────────────────────────────────────────────────────────────

/// Defaults, file and environment, validated
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = PipelineConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Schema file when present, otherwise the built-in phishing schema
fn resolve_schema(config: &PipelineConfig) -> anyhow::Result<Schema> {
    if config.schema_path.exists() {
        Ok(Schema::load(&config.schema_path)?)
    } else {
        tracing::warn!(
            path = %config.schema_path.display(),
            "schema file not found, using built-in phishing schema"
        );
        Ok(Schema::phishing(&config.target_column))
    }
}

fn banner(title: &str) {
    println!();
    line_box_top();
    line_box_center(&format!("{}", title.white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_bottom();
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    mut config: PipelineConfig,
    data: Option<PathBuf>,
    train: Option<PathBuf>,
    test: Option<PathBuf>,
    artifact_dir: Option<PathBuf>,
    expected_accuracy: Option<f64>,
    n_jobs: Option<usize>,
    no_tracking: bool,
) -> anyhow::Result<()> {
    banner("PhishGuard Training");

    if let Some(dir) = artifact_dir {
        config.artifact_dir = dir;
    }
    if let Some(acc) = expected_accuracy {
        config.trainer.expected_accuracy = acc;
    }
    if n_jobs.is_some() {
        config.trainer.n_jobs = n_jobs;
    }
    if no_tracking {
        config.tracking.enabled = false;
    }
    config.validate()?;

    let source = match (data, train, test) {
        (Some(path), _, _) => DataSource::Export(path),
        (None, Some(train), Some(test)) => DataSource::Splits { train, test },
        _ => anyhow::bail!("either --data or both --train and --test are required"),
    };

    let schema = resolve_schema(&config)?;

    section("Pipeline");
    println!("  {}", kv("Artifacts  ", &config.artifact_dir.display().to_string()));
    println!("  {}", kv("Production ", &config.final_model_dir.display().to_string()));
    println!("  {}", kv("Families   ", &config.trainer.families.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")));
    println!();

    step_run("Running");
    let start = Instant::now();
    let run = TrainingPipeline::new(config).with_schema(schema).run(&source);
    let elapsed = start.elapsed();

    let trace = run
        .history
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" → ");

    match run.state() {
        PipelineState::Done => step_done(&format!("{elapsed:.2?}")),
        _ => println!("{}", bad("failed")),
    }
    println!("  {}", dim(&trace));

    if let Some(error) = run.error() {
        println!();
        step_fail(&error.to_string());
        println!();
        anyhow::bail!("training pipeline failed: {error}");
    }

    if let Some(artifact) = run.artifact() {
        section("Winner");
        println!("  {:<16} {}", muted("Family"), artifact.family.to_string().cyan());
        println!("  {:<16} {:.4}", muted("Train accuracy"), artifact.train_accuracy);
        println!("  {:<16} {:.4}", muted("Test accuracy"), artifact.test_accuracy);
        println!("  {:<16} {:.4}", muted("Test precision"), artifact.test_metrics.precision);
        println!("  {:<16} {:.4}", muted("Test recall"), artifact.test_metrics.recall);
        println!("  {:<16} {:.4}", muted("Test F1"), artifact.test_metrics.f1_score);
        println!();
        step_ok(&format!("Model saved to {}", artifact.production_model_path.display()));
        println!("  {}", dim(&format!("run directory {}", run.layout.root().display())));
    }
    println!();
    Ok(())
}

pub fn cmd_validate(config: PipelineConfig, train: &Path, test: &Path, output: &Path) -> anyhow::Result<()> {
    section("Validate");

    let schema = resolve_schema(&config)?;
    let ingestion = DataIngestion::from_existing(train, test)?;
    let validation = DataValidation::new(schema, config.validation.significance)?;

    step_run("Checking schema and drift");
    let start = Instant::now();
    let outcome = validation.validate(&ingestion, &RunLayout::at(output))?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    println!("  {:<28} {:>10} {:>8}", muted("Column"), muted("p-value"), muted("Drift"));
    println!("  {}", dim(&"─".repeat(48)));
    for (column, drift) in outcome.drift_report.iter() {
        let flag = if drift.drift_flag { bad("yes") } else { dim("no") };
        println!("  {:<28} {:>10.4} {:>8}", column, drift.p_value, flag);
    }
    println!();

    if outcome.status {
        step_ok("No drift detected");
    } else {
        step_fail(&format!("Drift in {}", outcome.drift_report.drifted_columns().join(", ")));
    }
    println!("  {}", dim(&format!("report {}", outcome.drift_report_path.display())));
    println!();
    Ok(())
}

pub fn cmd_predict(config: PipelineConfig, data: &Path, model: Option<&Path>, output: &Path) -> anyhow::Result<()> {
    section("Predict");

    let model_path = model
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.production_model_path());

    step_run("Loading model");
    let model = init_production(&model_path)?;
    step_done(&model.family().to_string());

    step_run("Loading data");
    let df = DataLoader::new().load_csv(data)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    step_run("Predicting");
    let start = Instant::now();
    let mut annotated = model.annotate_frame(&df)?;
    step_done(&format!("{:?}", start.elapsed()));

    DataSaver::save_csv(&mut annotated, output)?;
    step_ok(&format!("{} written to {}", PREDICTED_COLUMN, output.display()));
    println!();
    Ok(())
}

pub fn cmd_predict_url(
    config: PipelineConfig,
    urls: Option<&str>,
    features: &Path,
    model: Option<&Path>,
    threshold: Option<f64>,
) -> anyhow::Result<()> {
    section("Predict URL");

    let model_path = model
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.production_model_path());
    let model = init_production(&model_path)?;
    let extractor = PrecomputedFeatures::load(features)?;
    let threshold = threshold.unwrap_or(config.serving.classification_threshold);

    let urls = match urls {
        Some(urls) => urls.to_string(),
        None => std::io::read_to_string(std::io::stdin())?,
    };
    let predictions = model.predict_urls(&extractor, &urls, threshold)?;
    if predictions.is_empty() {
        anyhow::bail!("no URLs given");
    }

    println!("  {:<40} {:>12} {:>10}", muted("URL"), muted("Verdict"), muted("P(phish)"));
    println!("  {}", dim(&"─".repeat(64)));
    for p in &predictions {
        let verdict = match p.label {
            Verdict::Phishing => bad("phishing"),
            Verdict::Legitimate => ok("legitimate"),
        };
        println!("  {:<40} {:>12} {:>10.4}", p.url, verdict, p.p_phishing);
    }
    println!();
    Ok(())
}

pub fn cmd_schema(config: PipelineConfig, output: Option<&Path>) -> anyhow::Result<()> {
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.schema_path.clone());
    let schema = Schema::phishing(&config.target_column);
    save_json(&path, &schema)?;
    step_ok(&format!("{} columns written to {}", schema.len(), path.display()));
    Ok(())
}

pub fn cmd_info(config: PipelineConfig, data: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let df = DataLoader::new().load_csv(data)?;
    let schema = resolve_schema(&config)?;
    let names = df
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
    let check = schema.check_columns(&names);

    println!();
    line_box_top();
    line_box(&kv("File    ", &data.display().to_string()));
    line_box(&kv("Rows    ", &df.height().to_string()));
    line_box(&kv("Columns ", &df.width().to_string()));
    line_box_sep();
    if check.is_conformant() {
        line_box(&format!("{}", ok("schema conformant")));
    } else {
        line_box(&kv("Missing ", &check.missing.len().to_string()));
        line_box(&kv("Extra   ", &check.extra.len().to_string()));
    }
    line_box_bottom();
    println!();

    println!("  {:<24} {:<12} {:>6}", muted("Column"), muted("Type"), muted("Nulls"));
    println!("  {}", dim(&"─".repeat(44)));
    for col in df.get_columns() {
        println!(
            "  {:<24} {:<12} {:>6}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
        );
    }
    for name in &check.missing {
        println!("  {:<24} {}", name, bad("missing"));
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        let colored = format!("{}", "hello".red());
        assert_eq!(strip_ansi(&colored), "hello");
    }

    #[test]
    fn test_parse_train_with_splits() {
        let cli = Cli::try_parse_from([
            "phishguard", "train", "--train", "a.csv", "--test", "b.csv", "-j", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Train { train, test, n_jobs, data, .. } => {
                assert_eq!(train, Some(PathBuf::from("a.csv")));
                assert_eq!(test, Some(PathBuf::from("b.csv")));
                assert_eq!(n_jobs, Some(2));
                assert!(data.is_none());
            }
            _ => panic!("expected train"),
        }
    }

    #[test]
    fn test_parse_rejects_data_with_splits() {
        let parsed = Cli::try_parse_from([
            "phishguard", "train", "--data", "x.csv", "--train", "a.csv", "--test", "b.csv",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["phishguard", "info", "-d", "x.csv", "--config", "p.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("p.toml")));
    }
}
