//! Batch attribution CLI.
//!
//! Reads a batch file of products with their retrieved sources, runs every
//! requested task for each product and appends one JSON outcome per product
//! to the output file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use product_attribution::pipeline::contract::{candidate_contract, finalized_contract};
use product_attribution::security::ModelSettings;
use product_attribution::{
    ArbitrationMode, GatePolicy, JsonlSink, OpenAIModel, Pipeline, PipelineConfig, ProductContext,
    RecordSink, RetrievedSources, SchemaRegistry, StaticSourceProvider,
};

const DEFAULT_TASKS: [&str; 3] = ["nutrition", "ingredients", "allergens"];

#[derive(Parser)]
#[command(name = "attribute")]
#[command(about = "Extract and reconcile product attributes from scraped sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch file and write outcomes as JSONL
    Run {
        /// Batch file (JSON)
        input: PathBuf,

        /// Output file (JSONL)
        output: PathBuf,

        /// Tasks to run; overrides the batch file
        #[arg(long, value_delimiter = ',')]
        tasks: Vec<String>,

        /// Arbitrate with the fixed tier/majority policy instead of a model call
        #[arg(long)]
        deterministic: bool,

        /// Undetermined-rate threshold for dropping candidates
        #[arg(long)]
        threshold: Option<f64>,

        /// Append to the output file instead of truncating it
        #[arg(long)]
        append: bool,
    },

    /// List registered schemas
    Schemas,

    /// Print the output contracts for a schema
    Contract { name: String },
}

#[derive(Debug, Deserialize)]
struct BatchFile {
    #[serde(default)]
    tasks: Vec<String>,
    products: Vec<BatchProduct>,
}

#[derive(Debug, Deserialize)]
struct BatchProduct {
    #[serde(flatten)]
    product: ProductContext,
    #[serde(default)]
    sources: RetrievedSources,
}

async fn run(
    input: PathBuf,
    output: PathBuf,
    tasks: Vec<String>,
    deterministic: bool,
    threshold: Option<f64>,
    append: bool,
) -> Result<()> {
    let text = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let batch: BatchFile = serde_json::from_str(&text).context("Failed to parse batch file")?;

    let registry = SchemaRegistry::builtin();
    let tasks = if !tasks.is_empty() {
        tasks
    } else if !batch.tasks.is_empty() {
        batch.tasks
    } else {
        DEFAULT_TASKS.iter().map(|t| t.to_string()).collect()
    };
    for task in &tasks {
        if !registry.contains(task) {
            bail!("Unknown task: {task}");
        }
    }

    let mut gate = GatePolicy::default();
    if let Some(threshold) = threshold {
        gate = gate.with_max_undetermined_rate(threshold);
    }
    let mode = if deterministic {
        ArbitrationMode::Deterministic
    } else {
        ArbitrationMode::Model
    };
    let config = PipelineConfig::default().with_gate(gate).with_arbitration(mode);

    let settings = ModelSettings::from_env().context("Failed to load model settings")?;
    tracing::info!(model = %settings.model, vision_model = %settings.vision_model, "Model configured");
    let model = Arc::new(OpenAIModel::new(settings));

    let mut products = Vec::with_capacity(batch.products.len());
    let mut provider = StaticSourceProvider::new();
    for entry in batch.products {
        provider = provider.with_retrieved(entry.product.id.clone(), entry.sources);
        products.push(entry.product);
    }

    let sink: Box<dyn RecordSink> = if append {
        Box::new(JsonlSink::append(&output).await?)
    } else {
        Box::new(JsonlSink::create(&output).await?)
    };

    let pipeline = Pipeline::new(registry, model.clone(), model, config);
    tracing::info!(products = products.len(), tasks = ?tasks, "Starting batch");

    let summary = pipeline
        .run_batch(&products, &tasks, &provider, sink.as_ref())
        .await
        .context("Batch run failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,product_attribution=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            tasks,
            deterministic,
            threshold,
            append,
        } => run(input, output, tasks, deterministic, threshold, append).await,
        Commands::Schemas => {
            let registry = SchemaRegistry::builtin();
            for name in registry.names() {
                let schema = registry.schema(name)?;
                println!(
                    "{name}\tv{}\t{} fields\t{} gate fields",
                    schema.version,
                    schema.fields.len(),
                    schema.gate_fields().len()
                );
            }
            Ok(())
        }
        Commands::Contract { name } => {
            let registry = SchemaRegistry::builtin();
            let schema = registry.schema(&name)?;
            let finalized = registry.finalized(&name)?;
            let contracts = serde_json::json!({
                "candidate": candidate_contract(schema).schema,
                "finalized": finalized_contract(&finalized).schema,
            });
            println!("{}", serde_json::to_string_pretty(&contracts)?);
            Ok(())
        }
    }
}
