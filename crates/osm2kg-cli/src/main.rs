//! OSM2KG CLI - Command-line interface
//!
//! Usage:
//!   osm2kg classify <train> <test> <config> <experiment_id> <fold>
//!   osm2kg embed <tags> <epochs> <dim> <out_dir>

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use osm2kg_classifier::{
    run_classification, ClassificationJob, InMemoryResults, PgResultsStore,
};
use osm2kg_core::{ClassifierConfig, EmbeddingConfig, LoggingConfig};
use osm2kg_embedding::run_embedding;

#[derive(Parser)]
#[command(name = "osm2kg")]
#[command(about = "OSM to knowledge graph link classification and tag embeddings")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines (also enabled by LOG_FORMAT=json)
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train and evaluate a link classifier on one fold
    Classify {
        /// Training data (tab-separated)
        train: PathBuf,
        /// Test data (tab-separated)
        test: PathBuf,
        /// key=value configuration file
        config: PathBuf,
        experiment_id: i32,
        fold: i32,
        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,
        /// Hyperparameter search threads
        #[arg(long)]
        workers: Option<usize>,
        /// Keep results in memory instead of writing to the database
        #[arg(long)]
        skip_db: bool,
    },
    /// Train key-value embeddings of tagged entities
    Embed {
        /// Tag data (id, key, value; tab-separated)
        tags: PathBuf,
        epochs: usize,
        dim: usize,
        out_dir: PathBuf,
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
        /// Value vocabulary size including UNK
        #[arg(long, default_value_t = 1000)]
        num_values: usize,
        /// Hold out the last N records for a validation loss
        #[arg(long, default_value_t = 0)]
        validation_records: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_tracing(log_json: bool) {
    let logging = LoggingConfig::from_env();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log_json || logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// One ninth of the logical cores, at least one
fn workers_for(cores: usize) -> usize {
    (cores / 9).max(1)
}

fn default_workers() -> usize {
    workers_for(std::thread::available_parallelism().map_or(1, |n| n.get()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Classify {
            train,
            test,
            config,
            experiment_id,
            fold,
            seed,
            workers,
            skip_db,
        } => {
            let mut settings = ClassifierConfig::from_file(&config)
                .and_then(ClassifierConfig::with_env_override)
                .with_context(|| format!("loading {}", config.display()))?;
            if let Some(seed) = seed {
                settings.seed = seed;
            }
            settings.workers = Some(workers.or(settings.workers).unwrap_or_else(default_workers));

            let job = ClassificationJob {
                train_path: train,
                test_path: test,
                experiment_id,
                fold,
            };
            tracing::info!(
                model = %settings.model,
                experiment_id,
                fold,
                workers = settings.workers,
                "starting classification"
            );

            let outcome = if skip_db {
                let mut repo = InMemoryResults::new();
                run_classification(&job, &settings, &mut repo).await?
            } else {
                let mut repo = PgResultsStore::connect(&settings.database).await?;
                run_classification(&job, &settings, &mut repo).await?
            };

            tracing::info!(
                classifier = outcome.classifier,
                params = %outcome.params_json(),
                f1_macro = outcome.f1_macro(),
                output = %outcome.prediction_path.display(),
                "classification finished"
            );
        }
        Commands::Embed {
            tags,
            epochs,
            dim,
            out_dir,
            batch_size,
            num_values,
            validation_records,
            seed,
        } => {
            let mut config = EmbeddingConfig::new(epochs, dim)
                .with_batch_size(batch_size)
                .with_num_values(num_values)
                .with_validation_records(validation_records);
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }

            let outcome = run_embedding(&tags, &out_dir, &config)?;
            tracing::info!(
                entities = outcome.entities,
                output = %outcome.output_path.display(),
                "embedding finished"
            );
        }
    }

    Ok(())
}
