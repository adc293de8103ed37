//! vendstock server and migration CLI.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use vendstock::config::StoreBackend;
use vendstock::migration::{inventory_migrations, startup_migrations, Migrator};
use vendstock::{
    connect, AppConfig, EntityStore, MayPostgresExecutor, MemoryStore, PgStore, Router,
    VendstockService,
};

#[derive(Parser)]
#[command(name = "vendstock")]
#[command(about = "Vending machine inventory service")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print tracing spans as they close
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Keep everything in memory instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },

    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply pending migrations
    Up,
    /// Show applied and pending migrations
    Status,
    /// Roll back the latest migration
    Down,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    if cli.trace {
        init_tracing();
    }

    let config = AppConfig::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port, memory } => serve(config, host, port, memory),
        Commands::Migrate { action } => migrate(&config, action),
    }
}

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::fmt::format::FmtSpan;

    if let Err(e) = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
    {
        log::warn!("tracing subscriber not installed: {e}");
    }
}

#[cfg(not(feature = "tracing"))]
fn init_tracing() {
    log::warn!("--trace has no effect: built without the `tracing` feature");
}

fn serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    memory: bool,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if memory {
        config.store.backend = StoreBackend::Memory;
    }

    may::config().set_workers(config.server.workers);

    let store: Arc<dyn EntityStore> = match config.store.backend {
        StoreBackend::Memory => {
            log::warn!("using the in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            let store = PgStore::connect(&config.database).context("failed to open connection pool")?;
            if config.database.run_migrations {
                store
                    .with_executor(startup_migrations)
                    .map_err(|e| anyhow!("{e}"))?
                    .context("startup migrations failed")?;
            }
            Arc::new(store)
        }
    };

    let address = config.server.bind_address();
    let server = may_minihttp::HttpServer(VendstockService::new(Router::new(store)))
        .start(&address)
        .with_context(|| format!("failed to bind {address}"))?;
    log::info!(
        "vendstock listening on http://{address} with {} workers",
        config.server.workers
    );

    server
        .join()
        .map_err(|e| anyhow!("server stopped unexpectedly: {e:?}"))
}

fn migrate(config: &AppConfig, action: MigrateAction) -> anyhow::Result<()> {
    let client = connect(&config.database.url).context("failed to connect to PostgreSQL")?;
    let executor = MayPostgresExecutor::new(client);
    let migrator = Migrator::new(inventory_migrations())?;

    match action {
        MigrateAction::Up => {
            let applied = migrator.up(&executor)?;
            println!("Applied {applied} migration(s)");
        }
        MigrateAction::Status => {
            let status = migrator.status(&executor)?;
            println!("Applied migrations ({}):", status.applied.len());
            for record in &status.applied {
                let took = record
                    .execution_time_ms
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "N/A".to_string());
                println!(
                    "  m{}_{} ({}, {took})",
                    record.version,
                    record.name,
                    record.applied_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!("Pending migrations ({}):", status.pending.len());
            for pending in &status.pending {
                println!("  m{}_{}", pending.version, pending.name);
            }
        }
        MigrateAction::Down => match migrator.down(&executor)? {
            Some(record) => println!("Rolled back m{}_{}", record.version, record.name),
            None => println!("No migrations to roll back"),
        },
    }
    Ok(())
}
