//! Lightning Search engine - fulltext search over SQLite served via HTTP.
//!
//! Configuration comes from the `LIGHTNING_SEARCH_*` / `DB_*` environment
//! the supervisor injects. `seed <count>` bulk-loads fake companies instead
//! of serving.

mod pool;
mod search;
mod seed;
mod server;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use settings::EngineSettings;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lightning-search")]
#[command(about = "Fulltext search service for Lightning Search")]
struct Args {
    /// Port to listen on (overrides LIGHTNING_SEARCH_PORT, 0 = auto-assign)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides LIGHTNING_SEARCH_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve search requests (default)
    Serve,
    /// Insert generated company rows
    Seed {
        /// Number of rows to insert
        #[arg(default_value = "100")]
        count: usize,

        /// Target table
        #[arg(long)]
        table: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut settings = EngineSettings::from_env();
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(host) = args.host {
        settings.host = host;
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings),
        Command::Seed { count, table } => {
            let table = table.unwrap_or_else(|| settings.default_table.clone());
            run_seed(&settings, &table, count)
        }
    }
}

fn serve(settings: EngineSettings) -> Result<()> {
    info!("=== Lightning Search Service ===");
    info!("CPU cores: {}", settings.cpu_cores);
    info!("Max DB connections: {}", settings.max_connections);
    info!("Cache duration: {}s", settings.cache_duration.as_secs());
    info!("Result limit: {}", settings.result_limit);
    info!("Database: {}", settings.database.display());
    info!("OS/Arch: {}/{}", std::env::consts::OS, std::env::consts::ARCH);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.cpu_cores)
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let pool = pool::ConnectionPool::new(&settings.database, settings.max_connections);
        pool.with_conn(|conn| Ok(conn.execute_batch("SELECT 1")?))
            .await
            .with_context(|| format!("opening database {}", pool.path().display()))?;

        let state = server::AppState {
            executor: search::SearchExecutor::new(
                pool,
                settings.cache_duration,
                settings.result_limit,
            ),
            default_table: settings.default_table.clone(),
        };
        let addr = server::start_server(state, &settings.host, settings.port).await?;

        // Print port for the supervisor to read (intentional stdout)
        println!("SEARCH_PORT={}", addr.port());

        info!("Search server running on {}", addr);

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received, exiting");
        Ok::<(), anyhow::Error>(())
    })
}

fn run_seed(settings: &EngineSettings, table: &str, count: usize) -> Result<()> {
    let mut conn = Connection::open(&settings.database)
        .with_context(|| format!("opening database {}", settings.database.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    seed::seed(&mut conn, table, count, &mut out)?;
    Ok(())
}
