//! historian-frames: run panel queries against a fixture historian and
//! print the resulting tables

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use clap::{Parser, ValueEnum};
use hf_core::EngineConfig;
use hf_data::Table;
use hf_query::{CancelScope, DataQuery, Fixture, FixtureApi, QueryDispatcher};
use tracing::{error, info};

/// Reshape historian query results into tables
#[derive(Parser)]
#[command(name = "historian-frames")]
#[command(version)]
#[command(about = "Run historian panel queries and print the resulting tables", long_about = None)]
struct Cli {
    /// Historian fixture (JSON) the queries run against
    #[arg(short, long)]
    fixture: PathBuf,

    /// Panel queries (JSON array)
    queries: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of queries run at once
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Pretty)]
    format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Csv,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(max) = cli.max_concurrent {
        config.max_concurrent_queries = max.max(1);
    }
    Ok(config)
}

fn load_queries(path: &Path) -> Result<Vec<DataQuery>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read queries {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid queries in {}", path.display()))
}

fn print_tables(ref_id: &str, tables: &[Table], format: Format) -> Result<()> {
    let batches = tables
        .iter()
        .map(Table::to_record_batch)
        .collect::<Result<Vec<RecordBatch>, _>>()?;

    for (table, batch) in tables.iter().zip(&batches) {
        println!("== {} / {} ({} rows)", ref_id, table.name, table.row_count());
        match format {
            Format::Pretty => {
                let rendered = arrow::util::pretty::pretty_format_batches(std::slice::from_ref(batch))?;
                println!("{rendered}");
            }
            Format::Csv => {
                let mut writer = arrow::csv::Writer::new(std::io::stdout());
                writer.write(batch)?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let fixture = Fixture::load(&cli.fixture)
        .with_context(|| format!("failed to load fixture {}", cli.fixture.display()))?;
    let queries = load_queries(&cli.queries)?;
    info!("loaded {} queries", queries.len());

    let dispatcher = QueryDispatcher::new(Arc::new(FixtureApi::new(fixture)), config);
    let scope = CancelScope::new();
    let responses = tokio::select! {
        responses = dispatcher.run_batch(queries, &scope) => responses,
        _ = tokio::signal::ctrl_c() => {
            scope.cancel();
            anyhow::bail!("interrupted");
        }
    };

    let mut failed = 0;
    for (ref_id, response) in &responses {
        match response {
            Ok(tables) => print_tables(ref_id, tables, cli.format)?,
            Err(err) => {
                failed += 1;
                error!("query {} failed: {}", ref_id, err);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} queries failed", failed, responses.len());
    }
    Ok(())
}
