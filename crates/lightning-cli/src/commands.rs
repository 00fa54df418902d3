//! Command implementations.

use crate::{Cli, Command};
use anyhow::{anyhow, bail, Context, Result};
use lightning_core::config::{DatabaseConfig, EngineConfig};
use lightning_core::{
    EngineSupervisor, LightningConfig, LightningError, LightningSearch, PlatformTarget, SearchMode,
    StartOutcome, StopOutcome,
};
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{ExitCode, ExitStatus};
use std::time::Instant;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config = LightningConfig::load(&cli.config)?;

    match cli.command {
        Command::Install => install(&cli.config, &config).await,
        Command::Start { daemon } => start(&config, daemon).await,
        Command::Stop => stop(&config),
        Command::Uninstall { force } => uninstall(&config, force),
        Command::Index { entity_type, drop } => index(&cli.config, config, entity_type, drop),
        Command::Seed {
            count,
            skip_compile,
            table,
        } => seed(&config, count, skip_compile, table).await,
        Command::Search {
            entity_type,
            query,
            mode,
        } => search(config, &entity_type, &query, mode).await,
    }
}

async fn install(path: &Path, config: &LightningConfig) -> Result<ExitCode> {
    let toolchain = check_toolchain().await?;
    println!("Found {}", toolchain);

    for warning in database_warnings(&config.database) {
        warn!("{}", warning);
    }

    if !path.exists() {
        config.save(path)?;
        println!("Wrote default configuration to {}", path.display());
    }

    let host = PlatformTarget::host()
        .ok_or_else(|| anyhow!("no engine build target matches this platform"))?;
    let mut supervisor = EngineSupervisor::new(config);
    for binary in supervisor.compile(&[host]).await? {
        println!("Installed {}", binary.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn check_toolchain() -> Result<String> {
    let output = tokio::process::Command::new("cargo")
        .arg("--version")
        .output()
        .await
        .context("cargo not found; install the Rust toolchain from https://rustup.rs")?;
    if !output.status.success() {
        bail!("cargo --version failed with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Problems with the database settings that do not stop installation.
pub fn database_warnings(db: &DatabaseConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if !db.connection.eq_ignore_ascii_case("sqlite") {
        warnings.push(format!(
            "DB_CONNECTION={} is not supported; the engine reads SQLite",
            db.connection
        ));
    }
    if db.database.trim().is_empty() {
        warnings.push("DB_DATABASE is empty".to_string());
    }
    if !db.is_local_host() && db.password.is_empty() {
        warnings.push(format!(
            "no database password set for non-local host {}",
            db.host
        ));
    }
    warnings
}

async fn start(config: &LightningConfig, daemon: bool) -> Result<ExitCode> {
    let mut supervisor = EngineSupervisor::new(config);
    match supervisor.start(daemon).await? {
        StartOutcome::Detached { pid } => {
            println!("Lightning Search started in background (PID {})", pid);
            if supervisor.wait_for_ready(EngineConfig::READY_TIMEOUT).await {
                println!("Listening on {}", config.service.base_url());
            } else {
                warn!(
                    "Engine is not answering yet; see {}",
                    supervisor.log_file().display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        StartOutcome::Exited(status) => Ok(exit_status_code(status)),
    }
}

fn stop(config: &LightningConfig) -> Result<ExitCode> {
    let mut supervisor = EngineSupervisor::new(config);
    match supervisor.stop()? {
        StopOutcome::Stopped { count } => println!("Stopped {} engine process(es)", count),
        StopOutcome::NotRunning => println!("Lightning Search is not running"),
    }
    Ok(ExitCode::SUCCESS)
}

fn uninstall(config: &LightningConfig, force: bool) -> Result<ExitCode> {
    if !force {
        let stdin = std::io::stdin();
        let confirmed = confirm(
            &mut stdin.lock(),
            &mut std::io::stdout(),
            "Stop Lightning Search and remove its binaries? [y/N] ",
        )?;
        if !confirmed {
            println!("Uninstall cancelled");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let mut supervisor = EngineSupervisor::new(config);
    supervisor.uninstall()?;
    println!("Removed engine binaries from {}", config.build.bin_dir.display());
    Ok(ExitCode::SUCCESS)
}

/// Ask a yes/no question; anything but `y`/`yes` is a no.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Result<bool> {
    write!(output, "{}", prompt)?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn index(
    path: &Path,
    config: LightningConfig,
    entity_type: Option<String>,
    drop: bool,
) -> Result<ExitCode> {
    let search = LightningSearch::open(config)?;
    let entity_types = match entity_type {
        Some(t) => vec![t],
        None => search.known_entity_types(),
    };
    if entity_types.is_empty() {
        bail!(
            "no entity types configured; pass one or add it under \"models\" in {}",
            path.display()
        );
    }

    let mut failed = 0usize;
    for entity_type in entity_types {
        if drop {
            match search.drop_index(&entity_type) {
                Ok(()) => println!("{}: index removed", entity_type),
                Err(e) => {
                    warn!("Failed to remove index for {}: {}", entity_type, e);
                    failed += 1;
                }
            }
            continue;
        }

        match search.rebuild_index(&entity_type) {
            Ok(stats) => println!(
                "{}: {} rows in {} ({})",
                entity_type,
                stats.row_count,
                stats.index_name,
                stats.columns.join(", ")
            ),
            Err(LightningError::NotSearchable { .. }) => {
                warn!("Skipping {}: no searchable fields", entity_type);
            }
            Err(e) => {
                warn!("Failed to index {}: {}", entity_type, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn seed(
    config: &LightningConfig,
    count: usize,
    skip_compile: bool,
    table: Option<String>,
) -> Result<ExitCode> {
    let mut supervisor = EngineSupervisor::new(config);
    if !skip_compile {
        supervisor
            .compile(&PlatformTarget::host_and_deployment())
            .await?;
    }

    let mut args = vec!["seed".to_string(), count.to_string()];
    if let Some(table) = table {
        args.push("--table".to_string());
        args.push(table);
    }

    info!("Seeding {} companies", count);
    let started = Instant::now();
    let status = supervisor.run_tool(&args).await?;
    if !status.success() {
        warn!("Seeder exited with {}", status);
        return Ok(exit_status_code(status));
    }

    let secs = started.elapsed().as_secs_f64();
    let rate = if secs > 0.0 { count as f64 / secs } else { 0.0 };
    println!("Seeding took {:.2}s ({:.0} records/sec)", secs, rate);
    Ok(ExitCode::SUCCESS)
}

async fn search(
    config: LightningConfig,
    entity_type: &str,
    query: &str,
    mode: Option<SearchMode>,
) -> Result<ExitCode> {
    let search = LightningSearch::open(config)?;
    let started = Instant::now();
    let entities = search.search(entity_type, query, mode).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for entity in &entities {
        serde_json::to_writer(&mut out, &entity.fields)?;
        writeln!(out)?;
    }
    info!(
        "{} {} found in {:.1}ms",
        entities.len(),
        entity_type,
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(ExitCode::SUCCESS)
}

fn exit_status_code(status: ExitStatus) -> ExitCode {
    if status.success() {
        return ExitCode::SUCCESS;
    }
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}
