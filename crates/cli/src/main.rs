use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use newscheck::{batch, gate, render};
use newscheck_core::artifacts::{self, ArtifactSet};
use newscheck_core::config::{self, AppConfig, LoggingConfig};
use newscheck_core::evaluation;
use newscheck_core::linguistic::LinguisticModel;
use newscheck_core::training::{self, TrainOptions};
use newscheck_core::vectorizer::FitOptions;
use newscheck_core::TextClassificationPipeline;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    init_tracing(&cfg.logging)?;

    match cli.command {
        Commands::Classify {
            text,
            file,
            json,
            min_chars,
        } => run_classify(cfg, text, file, json, min_chars).await,
        Commands::Normalize { text, file } => run_normalize(cfg, text, file).map(|_| ExitCode::SUCCESS),
        Commands::Batch { input, output } => run_batch(cfg, input, output)
            .await
            .map(|_| ExitCode::SUCCESS),
        Commands::Evaluate { data, json } => run_evaluate(cfg, data, json)
            .await
            .map(|_| ExitCode::SUCCESS),
        Commands::Train {
            data,
            out,
            min_df,
            alpha,
        } => run_train(cfg, data, out, min_df, alpha).map(|_| ExitCode::SUCCESS),
        Commands::Inspect { json } => run_inspect(cfg, json).map(|_| ExitCode::SUCCESS),
    }
}

#[derive(Parser)]
#[command(name = "newscheck")]
#[command(about = "Classify news article text as real or fake", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one article (argument, --file, or stdin)
    Classify {
        text: Option<String>,
        /// Read the article from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Output JSON result
        #[arg(long)]
        json: bool,
        /// Minimum article length; overrides classification.min_chars
        #[arg(long)]
        min_chars: Option<usize>,
    },
    /// Print the normalized form of a text
    Normalize {
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Classify JSONL records `{"id": .., "text": ..}`
    Batch {
        #[arg(long)]
        input: PathBuf,
        /// Write JSONL results here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score the loaded artifacts against labeled JSONL
    Evaluate {
        #[arg(long)]
        data: PathBuf,
        /// Output JSON report
        #[arg(long)]
        json: bool,
    },
    /// Fit new artifacts from labeled JSONL
    Train {
        #[arg(long)]
        data: PathBuf,
        /// Directory to write vector.json, model.json and manifest.json
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 1)]
        min_df: usize,
        /// Naive Bayes smoothing
        #[arg(long, default_value_t = 1.0)]
        alpha: f64,
    },
    /// Summarize the configured artifacts
    Inspect {
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(cfg: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.filter)
            .with_context(|| format!("invalid logging.filter {:?}", cfg.filter))?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cfg.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn build_pipeline(cfg: &AppConfig) -> Result<TextClassificationPipeline> {
    TextClassificationPipeline::from_config(cfg)
        .with_context(|| format!("load artifacts from {}", cfg.artifacts.dir))
}

/// Raw input bytes; decoding is left to the pipeline so bad encodings get a
/// normalization error instead of an opaque read failure.
fn read_input(text: Option<String>, file: Option<&Path>) -> Result<Vec<u8>> {
    if let Some(t) = text {
        return Ok(t.into_bytes());
    }
    if let Some(path) = file {
        return std::fs::read(path).with_context(|| format!("read {}", path.display()));
    }
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("read stdin")?;
    Ok(buf)
}

async fn run_classify(
    cfg: AppConfig,
    text: Option<String>,
    file: Option<PathBuf>,
    json: bool,
    min_chars: Option<usize>,
) -> Result<ExitCode> {
    let bytes = read_input(text, file.as_deref())?;
    let min = min_chars.unwrap_or(cfg.classification.min_chars);
    if let Err(e) = gate::check_min_chars(&String::from_utf8_lossy(&bytes), min) {
        warn!("Rejected input: {}", e);
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "status": "rejected",
                    "error": e.to_string(),
                }))?
            );
        } else {
            eprintln!("{e}");
        }
        return Ok(ExitCode::from(2));
    }

    let pipeline = Arc::new(build_pipeline(&cfg)?);
    let deadline = Duration::from_millis(cfg.classification.timeout_ms);
    let result = pipeline
        .with_deadline(deadline, move |p| p.classify_bytes_detailed(&bytes))
        .await?;
    if json {
        println!("{}", render::classification_json(&result)?);
    } else {
        println!("{}", render::classification_line(&result));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_normalize(cfg: AppConfig, text: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let text = String::from_utf8(read_input(text, file.as_deref())?)
        .context("input is not valid UTF-8")?;
    let model = match cfg.artifacts.linguistic_model_path() {
        Some(path) => LinguisticModel::load(&path)?,
        None => LinguisticModel::english()?,
    };
    println!("{}", model.normalize(&text));
    Ok(())
}

async fn run_batch(cfg: AppConfig, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let pipeline = Arc::new(build_pipeline(&cfg)?);
    let raw = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("read {}", input.display()))?;
    let results = batch::classify_lines(
        pipeline,
        &raw,
        Duration::from_millis(cfg.classification.timeout_ms),
    )
    .await;

    let mut out = String::new();
    for r in &results {
        out.push_str(&serde_json::to_string(r)?);
        out.push('\n');
    }
    match output {
        Some(path) => {
            tokio::fs::write(&path, out)
                .await
                .with_context(|| format!("write {}", path.display()))?;
            info!("Wrote {} results to {}", results.len(), path.display());
        }
        None => print!("{out}"),
    }
    Ok(())
}

async fn run_evaluate(cfg: AppConfig, data: PathBuf, json: bool) -> Result<()> {
    let pipeline = Arc::new(build_pipeline(&cfg)?);
    let samples = training::load_samples(&data)?;
    let deadline = Duration::from_millis(cfg.classification.timeout_ms);
    let report = evaluation::evaluate_with_deadline(&pipeline, &samples, deadline).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render::report_text(&report));
    }
    Ok(())
}

fn run_train(cfg: AppConfig, data: PathBuf, out: PathBuf, min_df: usize, alpha: f64) -> Result<()> {
    let samples = training::load_samples(&data)?;
    let linguistic = match cfg.artifacts.linguistic_model_path() {
        Some(path) => LinguisticModel::load(&path)?,
        None => LinguisticModel::english()?,
    };
    let options = TrainOptions {
        fit: FitOptions {
            min_df,
            ..FitOptions::default()
        },
        alpha,
    };
    let (vectorizer, classifier) = training::train(&samples, &linguistic, &options)?;
    let manifest = artifacts::write_artifacts(&out, &vectorizer, &classifier)?;
    println!(
        "trained on {} samples: {} terms, {} classifier, {} files written to {}",
        samples.len(),
        vectorizer.dim(),
        classifier.kind(),
        manifest.files.len() + 1,
        out.display()
    );
    Ok(())
}

fn run_inspect(cfg: AppConfig, json: bool) -> Result<()> {
    let set = ArtifactSet::load(&cfg.artifacts)
        .with_context(|| format!("load artifacts from {}", cfg.artifacts.dir))?;
    let summary = serde_json::json!({
        "dir": cfg.artifacts.dir,
        "linguistic_model": set.linguistic().name(),
        "linguistic_version": set.linguistic().version(),
        "stop_words": set.linguistic().stop_word_count(),
        "vocabulary": set.vectorizer().dim(),
        "classifier": set.classifier().kind(),
        "input_dim": set.classifier().input_dim(),
        "digests": set.digests(),
    });
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "linguistic model {} ({} stop words), {} terms, {} classifier",
            set.linguistic().name(),
            set.linguistic().stop_word_count(),
            set.vectorizer().dim(),
            set.classifier().kind()
        );
        for (name, digest) in set.digests() {
            println!("  {name}  blake3:{digest}");
        }
    }
    Ok(())
}
