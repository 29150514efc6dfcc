//! histdb command-line tool.
//!
//! Ingests block-versioned facts from JSON lines and runs named range
//! queries against a local database.

mod error;
mod formatter;
mod ingest;
mod query;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use histdb_core::registry::QueryConfig;
use histdb_core::storage::StorageConfig;
use histdb_core::Database;
use histdb_proto::QueryRequest;
use tracing::info;

use error::CliError;
use formatter::OutputFormat;

/// histdb command-line tool
#[derive(Parser, Debug)]
#[command(name = "histdb")]
#[command(version, about = "Block-versioned fact store with snapshot range queries")]
pub struct Args {
    /// Path to the data directory
    #[arg(short, long, default_value = "./histdb_data")]
    pub data_path: PathBuf,

    /// Query configuration file (tables, indexes, queries)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Cache size in megabytes
    #[arg(long, default_value_t = 64)]
    pub cache_size_mb: u64,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Append facts from a JSON-lines file
    Ingest {
        /// File with one `{table, block_index, present, fields}` object per line
        file: PathBuf,
    },

    /// Run a named query
    Query {
        /// Query name
        name: String,

        /// Snapshot block (defaults to the head block)
        #[arg(long)]
        max_block: Option<u64>,

        /// Inclusive lower bound as a JSON array
        #[arg(long)]
        first: String,

        /// Inclusive upper bound as a JSON array
        #[arg(long)]
        last: String,

        /// Rows per page
        #[arg(long, default_value_t = 100)]
        max_results: u32,

        /// Follow continuation tokens until the range is exhausted
        #[arg(long)]
        all: bool,
    },

    /// Show or set the head block
    Head {
        /// New head block
        #[arg(long)]
        set: Option<u64>,
    },

    /// List registered queries
    Queries,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("histdb=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Cache size in bytes, saturating for absurd megabyte counts.
fn cache_bytes(megabytes: u64) -> u64 {
    megabytes.saturating_mul(1024 * 1024)
}

fn run(args: Args) -> Result<(), CliError> {
    let storage = StorageConfig::new(&args.data_path)
        .with_cache_capacity(cache_bytes(args.cache_size_mb));
    let db = Database::open(storage)?;
    db.load_config(&QueryConfig::from_path(&args.config)?)?;
    let formatter = formatter::create_formatter(args.format);

    match args.command {
        Command::Ingest { file } => {
            let stats = ingest::ingest_file(&db, &file)?;
            db.flush()?;
            info!(
                lines = stats.lines,
                appended = stats.appended,
                unchanged = stats.unchanged,
                "ingest complete"
            );
            println!("{}", formatter.format_ingest(&stats, db.head_block()?));
        }
        Command::Query {
            name,
            max_block,
            first,
            last,
            max_results,
            all,
        } => {
            let first: serde_json::Value = serde_json::from_str(&first)?;
            let last: serde_json::Value = serde_json::from_str(&last)?;
            let first = db.bound_from_json(&name, &first)?;
            let last = db.bound_from_json(&name, &last)?;
            let request = QueryRequest::new(name)
                .at_block(max_block.unwrap_or(u64::MAX))
                .with_range(first, last)
                .with_max_results(max_results);

            let pages = query::run_query(&db, request, all, |response| {
                println!("{}", formatter.format_response(response));
            })?;
            info!(pages, "query complete");
        }
        Command::Head { set } => {
            if let Some(block_index) = set {
                db.set_head_block(block_index)?;
                db.flush()?;
            }
            println!("{}", formatter.format_head(db.head_block()?));
        }
        Command::Queries => {
            let registry = db.registry();
            println!("{}", formatter.format_queries(&registry.names()));
        }
    }

    Ok(())
}
