//! CLI interface for adaptive-classifier

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{self, ConfigStore};
use crate::feedback::FeedbackRequest;
use crate::scoring::FeatureSnapshot;
use crate::service::{ApiCredentials, ClassifierService, DiffBaseline};
use crate::types::{DocumentClass, UserConfidence};

#[derive(Parser)]
#[command(name = "adaptive-classifier")]
#[command(about = "Adaptive document classifier with self-tuning weights and thresholds", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "CLASSIFIER_CONFIG")]
    config: Option<PathBuf>,

    /// Key for configuration and learning-reset commands
    #[arg(long, global = true, env = "CLASSIFIER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one image from a JSON feature file
    Classify {
        /// JSON object of signal name to number or boolean
        #[arg(short, long)]
        features: PathBuf,
    },
    /// Submit a correction for a stored classification
    Feedback {
        /// Classification id returned by `classify`
        id: String,
        /// Correct class (work_report, typeplate, document, photo)
        #[arg(short, long)]
        class: DocumentClass,
        /// How sure the user is (low, medium, high)
        #[arg(long, default_value = "medium")]
        confidence: UserConfidence,
        /// Free-text reason for the correction
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Inspect and change the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Learning statistics and reset
    Learning {
        #[command(subcommand)]
        command: LearningCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the merged configuration
    Get {
        /// Only this top-level section
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Apply and persist a partial update (JSON or TOML file)
    Update {
        #[arg(short, long)]
        file: PathBuf,
        /// Validate and report warnings without applying
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-read the configuration file
    Reload {
        /// Keep runtime overrides (learning adjustments)
        #[arg(long)]
        keep_runtime: bool,
    },
    /// Reset to defaults, discarding runtime overrides
    Reset,
    /// Compare the current configuration to a baseline
    Diff {
        /// defaults, file or record-store
        #[arg(long, default_value = "defaults")]
        against: DiffBaseline,
    },
    /// Pull weights and thresholds from the record store
    Sync {
        /// Write them to the configuration file
        #[arg(long)]
        persist: bool,
    },
    /// Show configuration metadata
    Meta,
    /// Show every parameter with its default and allowed range
    Schema,
}

#[derive(Subcommand)]
enum LearningCommands {
    /// Show accuracy, distributions and recent feedback
    Stats,
    /// Clear learning history (weights and thresholds are kept)
    Reset,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };
    let store = Arc::new(ConfigStore::open(path).await);
    let service = ClassifierService::from_store(store, ApiCredentials::from_env())
        .await
        .context("Failed to initialize classifier service")?;
    service.bootstrap().await;

    let key = cli.api_key.as_deref();

    match cli.command {
        Commands::Classify { features } => {
            let features: FeatureSnapshot = serde_json::from_str(&read(&features).await?)
                .with_context(|| format!("Invalid feature file {}", features.display()))?;
            print_json(&service.classify(features).await)?;
        }
        Commands::Feedback {
            id,
            class,
            confidence,
            reason,
        } => {
            let request = FeedbackRequest {
                classification_id: id,
                corrected_class: class,
                user_confidence: confidence,
                reason,
            };
            let outcome = service
                .submit_feedback(&request)
                .await
                .context("Feedback rejected")?;
            print_json(&outcome)?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Get { section } => {
                print_json(&service.get_config(key, section.as_deref()).await?)?;
            }
            ConfigCommands::Update { file, dry_run } => {
                let updates = read_patch(&file).await?;
                let response = service
                    .update_config(key, &updates, dry_run)
                    .await
                    .context("Configuration update rejected")?;
                for warning in &response.warnings {
                    eprintln!("warning: {}", warning);
                }
                print_json(&response)?;
            }
            ConfigCommands::Reload { keep_runtime } => {
                print_json(&service.reload_config(key, !keep_runtime).await?)?;
            }
            ConfigCommands::Reset => {
                print_json(&service.reset_config(key).await?)?;
            }
            ConfigCommands::Diff { against } => {
                print_json(&service.diff_config(key, against).await?)?;
            }
            ConfigCommands::Sync { persist } => {
                print_json(&service.sync_from_record_store(key, persist).await?)?;
            }
            ConfigCommands::Meta => {
                print_json(&service.config_metadata(key).await?)?;
            }
            ConfigCommands::Schema => {
                print_json(&service.schema())?;
            }
        },
        Commands::Learning { command } => match command {
            LearningCommands::Stats => {
                print_json(&service.learning_statistics().await)?;
            }
            LearningCommands::Reset => {
                service.reset_learning(key).await?;
                println!("Learning history reset.");
            }
        },
    }

    Ok(())
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Partial configuration from a `.toml` or JSON file
async fn read_patch(path: &Path) -> Result<Value> {
    let content = read(path).await?;
    let is_toml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
