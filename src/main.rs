//! sensor-anomaly CLI: stream readings through the detection pipeline or
//! generate labelled synthetic data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use sensor_anomaly::source::jsonl::write_jsonl;
use sensor_anomaly::utils::synthetic::make_dataset;
use sensor_anomaly::{
    AnomalySink, DetectorKind, JsonlSink, JsonlStore, NullSink, Orchestrator, PipelineConfig, RunSummary,
    StoreBatchSource, TrainingReuse,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sensor-anomaly")]
#[command(author, version, about = "Batch anomaly detection for robot sensor streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Hide the progress spinner
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream readings from a JSON-lines file through a detector
    Run {
        /// JSON-lines file of sensor readings
        #[arg(short, long)]
        input: PathBuf,

        /// Pipeline settings file (toml, yaml or json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Readings per batch
        #[arg(short, long)]
        batch: Option<usize>,

        #[arg(short, long, value_enum)]
        detector: Option<DetectorArg>,

        /// Z-score threshold for the threshold detector
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Expected anomaly fraction for the model detector
        #[arg(long)]
        contamination: Option<f64>,

        /// Model file to load, or to save after training
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Batches drained to train a model when none is saved
        #[arg(long)]
        train_batches: Option<usize>,

        /// Write flagged readings to this JSON-lines file (cleared first)
        #[arg(short, long)]
        sink: Option<PathBuf>,

        /// Keep polling the input for new readings until Ctrl-C
        #[arg(long)]
        follow: bool,

        /// Also scan the batches used for training
        #[arg(long)]
        replay_training: bool,
    },

    /// Write a labelled synthetic dataset
    Generate {
        /// Number of readings
        #[arg(short = 'n', long, default_value = "1000")]
        samples: usize,

        /// Fraction of readings with an injected accel_x spike
        #[arg(short, long, default_value = "0.01")]
        anomaly_rate: f64,

        #[arg(long)]
        seed: Option<u64>,

        /// Output JSON-lines file
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DetectorArg {
    Threshold,
    Model,
}

impl From<DetectorArg> for DetectorKind {
    fn from(arg: DetectorArg) -> Self {
        match arg {
            DetectorArg::Threshold => DetectorKind::Threshold,
            DetectorArg::Model => DetectorKind::Model,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            config,
            batch,
            detector,
            threshold,
            contamination,
            model,
            train_batches,
            sink,
            follow,
            replay_training,
        } => {
            let mut cfg = PipelineConfig::load(config.as_deref()).context("loading pipeline config")?;
            if let Some(b) = batch {
                cfg.batch_size = b;
            }
            if let Some(d) = detector {
                cfg.detector = d.into();
            }
            if let Some(t) = threshold {
                cfg.threshold_sigma = t;
            }
            if let Some(c) = contamination {
                cfg.model.contamination = c;
            }
            if model.is_some() {
                cfg.model_path = model;
            }
            if let Some(n) = train_batches {
                cfg.train_batches = n;
            }
            cfg.follow |= follow;
            if replay_training {
                cfg.training_reuse = TrainingReuse::Replay;
            }
            cfg.validate().context("invalid pipeline settings")?;

            let sink: Box<dyn AnomalySink> = match sink {
                Some(path) => Box::new(JsonlSink::new(path)),
                None => Box::new(NullSink),
            };
            let summary = run(cfg, input, sink, cli.quiet).await?;
            print_summary(&summary);
        }
        Commands::Generate { samples, anomaly_rate, seed, out } => {
            anyhow::ensure!(
                (0.0..=1.0).contains(&anomaly_rate),
                "anomaly rate must be within [0, 1], got {anomaly_rate}"
            );
            let data = make_dataset(samples, anomaly_rate, seed);
            let written = write_jsonl(&out, &data).with_context(|| format!("writing {}", out.display()))?;
            let injected = data.iter().filter(|r| r.is_anomaly == Some(true)).count();
            info!(path = %out.display(), readings = written, injected, "synthetic dataset written");
            println!("wrote {written} readings ({injected} anomalies) to {}", out.display());
        }
    }
    Ok(())
}

async fn run(cfg: PipelineConfig, input: PathBuf, sink: Box<dyn AnomalySink>, quiet: bool) -> Result<RunSummary> {
    info!(input = %input.display(), ?cfg, "config loaded");
    let store = if cfg.follow {
        JsonlStore::tailing(&input)
    } else {
        JsonlStore::new(&input)
    };
    let source = StoreBatchSource::new(store, cfg.source_mode());

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {pos} batches, {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let mut orchestrator = Orchestrator::new(cfg, source, sink)?.with_progress(progress);
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, finishing current batch");
        }
    };
    orchestrator
        .run(shutdown)
        .await
        .with_context(|| format!("pipeline over {} failed", input.display()))
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} batches, {} readings, {} rows scored, {} anomalies{}",
        summary.batches,
        summary.readings,
        summary.scored_rows,
        summary.anomalies,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    if summary.training_rows > 0 {
        println!("model trained on {} rows", summary.training_rows);
    }
    if let Some(m) = summary.metrics() {
        println!(
            "precision {:.3}  recall {:.3}  f1 {:.3}  ({} labelled rows)",
            m.precision,
            m.recall,
            m.f1,
            summary.evaluation.labeled()
        );
    }
}

/// `RUST_LOG` filters (default `info`); `SENSOR_JSON_LOG=1` switches to JSON lines.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("SENSOR_JSON_LOG")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if json {
        builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder.with_line_number(true).try_init().map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}
