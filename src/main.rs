use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use performance_predictor::data::{load_training_set, write_training_set};
use performance_predictor::{initialize, synthetic, EngineConfig, FeatureVector, Predictor};

#[derive(Parser)]
#[command(name = "performance-predictor")]
#[command(about = "Predict expected student scores from grades, attendance and study hours", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "PREDICTOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on synthetic data if no model is persisted yet
    Init,
    /// Retrain the model, replacing any persisted one
    Train {
        /// CSV of historical observations; synthetic data when omitted
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Number of synthetic samples when no CSV is given
        #[arg(long)]
        samples: Option<usize>,
    },
    /// Predict an expected score
    Predict {
        #[arg(long)]
        previous_grade: f64,
        /// Omit for the three-field form
        #[arg(long)]
        current_grade: Option<f64>,
        #[arg(long)]
        attendance: f64,
        #[arg(long)]
        study_hours: f64,
    },
    /// Write a synthetic training set as CSV
    Generate {
        #[arg(long, default_value = "200")]
        samples: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long)]
        out: PathBuf,
        /// Drop current_grade from every row
        #[arg(long)]
        legacy: bool,
    },
    /// Show the currently persisted model
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Init => {
            let mut predictor = Predictor::new(&config);
            match initialize(&mut predictor, &config.bootstrap)? {
                Some(metrics) => println!(
                    "Initialized model with synthetic data: mse={:.3} r2={:.3} test_size={}",
                    metrics.mse, metrics.r2, metrics.test_size
                ),
                None => println!("Model already present in {}", config.model_dir.display()),
            }
        }
        Commands::Train { csv, samples } => {
            let set = match csv {
                Some(path) => load_training_set(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => synthetic::generate(
                    samples.unwrap_or(config.bootstrap.samples),
                    config.bootstrap.seed,
                )?,
            };

            let mut predictor = Predictor::untrained(&config);
            let metrics = predictor.train(&set).context("training failed")?;
            println!("Model trained on {} samples", set.len());
            println!("   R2:        {:.3}", metrics.r2);
            println!("   MSE:       {:.3}", metrics.mse);
            println!("   Test size: {}", metrics.test_size);
        }
        Commands::Predict {
            previous_grade,
            current_grade,
            attendance,
            study_hours,
        } => {
            let predictor = Predictor::new(&config);
            let features = FeatureVector {
                previous_grade,
                current_grade,
                attendance_percentage: attendance,
                study_hours,
            };
            let prediction = predictor.predict_detailed(&features);
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Commands::Generate {
            samples,
            seed,
            out,
            legacy,
        } => {
            let seed = seed.unwrap_or(config.bootstrap.seed);
            let set = if legacy {
                synthetic::generate_legacy(samples, seed)?
            } else {
                synthetic::generate(samples, seed)?
            };
            write_training_set(&set, &out)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Wrote {} samples to {}", set.len(), out.display());
        }
        Commands::Info => {
            let predictor = Predictor::new(&config);
            println!("{}", serde_json::to_string_pretty(&predictor.info())?);
        }
    }

    Ok(())
}
