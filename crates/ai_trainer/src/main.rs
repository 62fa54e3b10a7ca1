//! Chronic absenteeism predictor CLI
//!
//! Trains the risk model on a student upload, ranks the risk factors and
//! manages the persisted hyperparameters.

use absence_ai_core::{
    ConfigManager, HyperParamUpdate, Model, PipelineConfig, ScalePosWeight, DEFAULT_CONFIG_PATH,
    DEFAULT_TOP_K,
};
use absence_ai_trainer::{explain_upload, render_metrics, render_text, Pipeline};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "absence-predictor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chronic absenteeism risk model trainer and explainer", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on an upload and rank the top risk factors
    Train {
        /// CSV or spreadsheet upload
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Rank risk factors of an upload under an existing model
    Explain {
        #[arg(short, long)]
        input: PathBuf,

        /// Model artifact (defaults to `training.model_path`)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Number of features to rank
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// Show or change the persisted hyperparameters
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Copy the trained model artifact
    Export {
        /// Destination path
        #[arg(long)]
        to: PathBuf,

        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current configuration
    Show,

    /// Merge new values into `models.xgboost`
    Set {
        #[arg(long)]
        learning_rate: Option<f64>,

        #[arg(long)]
        max_depth: Option<usize>,

        /// `auto` or a positive ratio
        #[arg(long)]
        scale_pos_weight: Option<ScalePosWeight>,

        #[arg(long)]
        n_estimators: Option<usize>,

        #[arg(long)]
        min_child_weight: Option<f64>,

        #[arg(long)]
        reg_lambda: Option<f64>,

        #[arg(long)]
        gamma: Option<f64>,

        #[arg(long)]
        early_stopping_rounds: Option<usize>,
    },

    /// Write a default configuration file
    Init,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let manager = ConfigManager::new(&args.config);

    match args.command {
        Command::Train { input } => train(&manager, input),
        Command::Explain {
            input,
            model,
            top_k,
        } => explain(&manager, input, model, top_k),
        Command::Config { action } => config(&manager, action),
        Command::Export { to, model } => export(&manager, to, model),
    }
}

/// Configuration snapshot for this session; defaults when no file exists yet
fn load_config(manager: &ConfigManager) -> Result<PipelineConfig> {
    if !manager.path().exists() {
        warn!(
            "{} not found, using defaults (run `config init` to create it)",
            manager.path().display()
        );
        return Ok(PipelineConfig::default());
    }
    manager
        .read()
        .with_context(|| format!("Failed to read {}", manager.path().display()))
}

fn train(manager: &ConfigManager, input: PathBuf) -> Result<()> {
    info!("Absence Predictor v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════");

    let config = load_config(manager)?;
    info!("Hyperparameters:");
    info!("  learning_rate: {}", config.xgboost.learning_rate);
    info!("  max_depth: {}", config.xgboost.max_depth);
    info!("  scale_pos_weight: {}", config.xgboost.scale_pos_weight);
    info!("  n_estimators: {}", config.xgboost.n_estimators);

    let report = Pipeline::new(config)
        .run_path(&input)
        .with_context(|| format!("Training on {} failed", input.display()))?;

    info!("═══════════════════════════════════════════");
    info!("✓ Training completed successfully");
    info!("  Rows: {} ({} at risk)", report.rows, report.positives);
    info!("  scale_pos_weight: {:.4}", report.scale_pos_weight);
    info!("  Trees: {}", report.model.num_trees());
    info!("  Model: {}", report.model_path.display());
    info!("  Hash: {}", report.model.metadata.model_hash);
    info!("  Chart: {}", report.chart_path.display());

    println!("{}", render_metrics(&report.metrics));
    println!("{}", render_text(&report.ranking));
    Ok(())
}

fn explain(
    manager: &ConfigManager,
    input: PathBuf,
    model_path: Option<PathBuf>,
    top_k: usize,
) -> Result<()> {
    let model_path = match model_path {
        Some(path) => path,
        None => load_config(manager)?.training.model_path,
    };

    let model = Model::load_json(&model_path)
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;
    info!(
        "Loaded model {} ({} trees, {} features)",
        model_path.display(),
        model.num_trees(),
        model.num_features()
    );

    let file = std::fs::File::open(&input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let ranking = explain_upload(&model, file, &name, top_k)
        .with_context(|| format!("Failed to explain {}", input.display()))?;

    println!("{}", render_text(&ranking));
    Ok(())
}

fn config(manager: &ConfigManager, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = manager
                .read()
                .with_context(|| format!("Failed to read {}", manager.path().display()))?;
            println!("# {}", manager.path().display());
            println!("models.xgboost:");
            print_yaml(&config.xgboost)?;
            println!("training:");
            print_yaml(&config.training)?;
        }
        ConfigAction::Set {
            learning_rate,
            max_depth,
            scale_pos_weight,
            n_estimators,
            min_child_weight,
            reg_lambda,
            gamma,
            early_stopping_rounds,
        } => {
            let update = HyperParamUpdate {
                learning_rate,
                max_depth,
                scale_pos_weight,
                n_estimators,
                min_child_weight,
                reg_lambda,
                gamma,
                early_stopping_rounds,
            };
            if update.is_empty() {
                bail!("Nothing to set; pass at least one parameter");
            }
            let merged = manager
                .write(&update)
                .with_context(|| format!("Failed to update {}", manager.path().display()))?;
            info!("Configuration updated");
            print_yaml(&merged.xgboost)?;
        }
        ConfigAction::Init => {
            manager.init_default().context("Failed to write default configuration")?;
        }
    }
    Ok(())
}

fn print_yaml<T: serde::Serialize>(value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value).context("Failed to render configuration")?;
    for line in yaml.lines() {
        println!("  {}", line);
    }
    Ok(())
}

fn export(manager: &ConfigManager, to: PathBuf, model_path: Option<PathBuf>) -> Result<()> {
    let model_path = match model_path {
        Some(path) => path,
        None => load_config(manager)?.training.model_path,
    };

    // Refuse to hand out an artifact that does not load
    Model::load_json(&model_path)
        .with_context(|| format!("No usable model at {}", model_path.display()))?;

    std::fs::copy(&model_path, &to)
        .with_context(|| format!("Failed to copy model to {}", to.display()))?;
    info!("Model exported to {}", to.display());
    Ok(())
}
