//! knsindex CLI — run the KNS name indexer and inspect its state.
//!
//! # Commands
//! ```text
//! knsindex run    [--database-url <url>] [--scheme username|domain] ...
//! knsindex status [--database-url <url>]
//! knsindex info
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use knsindex_core::checkpoint::CheckpointStore;
use knsindex_core::classify::{NameScheme, DEFAULT_DOMAIN_ROOT, SENTINEL_ADDRESS, TOKEN_NAME};
use knsindex_core::indexer::{DEFAULT_LEDGER_BASE_URL, DEFAULT_METADATA_BASE_URL};
use knsindex_keeta::IndexerBuilder;
use knsindex_storage::postgres::PostgresStorage;
use knsindex_storage::sqlite::SqliteStorage;
use knsindex_storage::InMemoryStorage;

mod logging;

use logging::LogConfig;

#[derive(Parser, Debug)]
#[command(
    name = "knsindex",
    about = "KNS name indexer — derive a name registry from Keeta ledger history",
    long_about = "
knsindex polls the Keeta staples metadata and ledger history APIs, classifies
KNS inscriptions, transfers and metadata directives, and keeps a name registry
plus a resumable checkpoint in SQLite or PostgreSQL.

ENVIRONMENT VARIABLES:
  DATABASE_URL        sqlite path/URL, postgres:// URL, or `memory`
  KEETA_BASE_URL      Ledger API base URL
  KEETOOLS_BASE_URL   Staples metadata API base URL
  KNS_SCHEME          username | domain
  KNS_DOMAIN_ROOT     Parent domain for the domain scheme
  KNS_LOG_LEVEL       Default log level
  KNS_LOG_JSON        Emit JSON logs when true
",
    version
)]
struct Cli {
    /// Storage backend: a SQLite path or URL, a postgres:// URL, or `memory`
    #[arg(long, global = true, env = "DATABASE_URL", default_value = "./kns.db")]
    database_url: String,

    /// Default log level
    #[arg(long, global = true, env = "KNS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Per-crate log level, e.g. `knsindex_keeta=debug` (repeatable)
    #[arg(long = "log-component", global = true, value_parser = logging::parse_component)]
    log_components: Vec<(String, String)>,

    /// Emit JSON structured logs
    #[arg(long, global = true, env = "KNS_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the poll loop until Ctrl-C
    Run(RunArgs),

    /// Print the stored checkpoint and registry size
    Status,

    /// Show defaults and supported backends
    Info,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Ledger API base URL
    #[arg(long, env = "KEETA_BASE_URL", default_value = DEFAULT_LEDGER_BASE_URL)]
    ledger_url: String,

    /// Staples metadata API base URL
    #[arg(long, env = "KEETOOLS_BASE_URL", default_value = DEFAULT_METADATA_BASE_URL)]
    metadata_url: String,

    /// Which names to index
    #[arg(long, env = "KNS_SCHEME", value_enum, default_value_t = SchemeArg::Username)]
    scheme: SchemeArg,

    /// Parent domain for the domain scheme
    #[arg(long, env = "KNS_DOMAIN_ROOT", default_value = DEFAULT_DOMAIN_ROOT)]
    domain_root: String,

    /// Wait between cycles in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Page size sent to both APIs
    #[arg(long, default_value_t = 100)]
    page_limit: u32,

    /// First day of staples to index (YYYY-MM-DD)
    #[arg(long, default_value = "2025-11-20")]
    launch_date: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SchemeArg {
    Username,
    Domain,
}

impl RunArgs {
    fn scheme(&self) -> NameScheme {
        match self.scheme {
            SchemeArg::Username => NameScheme::Username,
            SchemeArg::Domain => NameScheme::Domain {
                root: self.domain_root.clone(),
            },
        }
    }
}

// ─── Storage backend selection ───────────────────────────────────────────────

/// Storage backend chosen from `--database-url`.
enum Backend {
    Memory(InMemoryStorage),
    Sqlite(SqliteStorage),
    Postgres(PostgresStorage),
}

#[derive(Debug, PartialEq, Eq)]
enum BackendKind {
    Memory,
    Sqlite,
    Postgres,
}

fn backend_kind(url: &str) -> BackendKind {
    if url == "memory" || url == ":memory:" {
        BackendKind::Memory
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        BackendKind::Postgres
    } else {
        BackendKind::Sqlite
    }
}

impl Backend {
    async fn open(url: &str) -> Result<Self> {
        let backend = match backend_kind(url) {
            BackendKind::Memory => Self::Memory(InMemoryStorage::new()),
            BackendKind::Sqlite => Self::Sqlite(
                SqliteStorage::open(url)
                    .await
                    .with_context(|| format!("opening SQLite database {url}"))?,
            ),
            BackendKind::Postgres => Self::Postgres(
                PostgresStorage::connect(url)
                    .await
                    .context("connecting to PostgreSQL")?,
            ),
        };
        Ok(backend)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }

    async fn registry_count(&self) -> Result<u64> {
        Ok(match self {
            Self::Memory(store) => store.entries().len() as u64,
            Self::Sqlite(store) => store.registry_count().await?,
            Self::Postgres(store) => store.registry_count().await?,
        })
    }

    fn as_store(&self) -> &dyn CheckpointStore {
        match self {
            Self::Memory(store) => store,
            Self::Sqlite(store) => store,
            Self::Postgres(store) => store,
        }
    }

    fn into_store(self) -> Box<dyn CheckpointStore> {
        match self {
            Self::Memory(store) => Box::new(store),
            Self::Sqlite(store) => Box::new(store),
            Self::Postgres(store) => Box::new(store),
        }
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        components: cli.log_components.iter().cloned().collect(),
        json: cli.log_json,
    });

    match cli.command {
        Commands::Run(ref args) => cmd_run(&cli.database_url, args).await,
        Commands::Status => cmd_status(&cli.database_url).await,
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn cmd_run(database_url: &str, args: &RunArgs) -> Result<()> {
    let backend = Backend::open(database_url).await?;
    info!(backend = backend.name(), scheme = ?args.scheme, "storage ready");

    let mut poll_loop = IndexerBuilder::new()
        .ledger_base_url(&args.ledger_url)
        .metadata_base_url(&args.metadata_url)
        .page_limit(args.page_limit)
        .launch_date(&args.launch_date)
        .poll_interval_ms(args.poll_interval_ms)
        .scheme(args.scheme())
        .build(backend.into_store())
        .context("building indexer")?;

    if let Err(e) = poll_loop.run().await {
        error!(error = %e, remote = e.is_remote(), store = e.is_store(), "cycle failed");
        return Err(e).context("indexer stopped on error");
    }
    Ok(())
}

async fn cmd_status(database_url: &str) -> Result<()> {
    let backend = Backend::open(database_url).await?;
    let checkpoint = backend
        .as_store()
        .load()
        .await
        .context("loading checkpoint")?;
    let names = backend.registry_count().await.context("counting registry rows")?;

    println!("Backend:          {}", backend.name());
    println!("Page:             {}", checkpoint.page);
    println!(
        "Last block time:  {}",
        checkpoint
            .last_block_timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "Last block hash:  {}",
        checkpoint.last_block_hash.as_deref().unwrap_or("-")
    );
    println!("Registered names: {names}");
    Ok(())
}

fn cmd_info() {
    println!("knsindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Ledger API:       {DEFAULT_LEDGER_BASE_URL}");
    println!("  Metadata API:     {DEFAULT_METADATA_BASE_URL}");
    println!("  Token name:       {TOKEN_NAME}");
    println!("  Sentinel address: {SENTINEL_ADDRESS}");
    println!("  Domain root:      {DEFAULT_DOMAIN_ROOT}");
    println!("  Default page size: 100, poll interval: 1000 ms");
    println!("  Storage backends: memory, SQLite, PostgreSQL");
}
