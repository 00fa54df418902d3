//! Integration tests for the lightning-search binary.
//!
//! Each test seeds a temp SQLite database through the `seed` mode, then
//! serves it on an auto-assigned port and talks to it over HTTP.

use lightning_core::config::ServiceConfig;
use lightning_core::{EngineBackend, EngineClient, EntityId, FulltextIndex, IndexDescriptor};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

fn engine_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lightning-search"))
}

fn engine_command(db: &Path) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(engine_binary());
    cmd.env("DB_CONNECTION", "sqlite")
        .env("DB_DATABASE", db)
        .env("LIGHTNING_SEARCH_CACHE_DURATION", "60")
        .env("LIGHTNING_SEARCH_RESULT_LIMIT", "100")
        .kill_on_drop(true);
    cmd
}

async fn seed_database(db: &Path, count: usize) -> String {
    let output = engine_command(db)
        .arg("seed")
        .arg(count.to_string())
        .stderr(Stdio::null())
        .output()
        .await
        .expect("failed to run seed");
    assert!(output.status.success(), "seed exited with {:?}", output.status);
    String::from_utf8(output.stdout).unwrap()
}

fn index_companies(db: &Path) {
    let conn = Connection::open(db).unwrap();
    let descriptor = IndexDescriptor::new(
        "companies",
        "companies",
        "id",
        vec!["name".into(), "city".into()],
        vec![],
    );
    FulltextIndex::new(&descriptor).ensure(&conn).unwrap();
}

struct EngineHandle {
    child: tokio::process::Child,
    port: u16,
}

impl EngineHandle {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    async fn stop(mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

/// Start the engine and read the port it prints.
async fn start_engine(db: &Path) -> EngineHandle {
    let mut child = engine_command(db)
        .arg("--port")
        .arg("0")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn lightning-search");

    let stdout = child.stdout.take().unwrap();
    let mut lines = tokio::io::BufReader::new(stdout).lines();
    let port = tokio::time::timeout(Duration::from_secs(20), async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(value) = line.strip_prefix("SEARCH_PORT=") {
                return value.trim().parse::<u16>().ok();
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
    .expect("SEARCH_PORT line not emitted");

    tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });
    EngineHandle { child, port }
}

fn first_company(db: &Path) -> (i64, String) {
    let conn = Connection::open(db).unwrap();
    conn.query_row("SELECT id, name FROM companies ORDER BY id LIMIT 1", [], |r| {
        Ok((r.get(0)?, r.get(1)?))
    })
    .unwrap()
}

#[tokio::test]
async fn test_seed_reports_progress() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("engine.db");

    let stdout = seed_database(&db, 40).await;
    assert!(stdout.lines().any(|l| l == "Progress: 100% (40/40)"));
    assert!(stdout.contains("Seeded 40 companies in "));

    let conn = Connection::open(&db).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 40);
}

#[tokio::test]
async fn test_search_over_http() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("engine.db");
    seed_database(&db, 60).await;
    index_companies(&db);
    let (first_id, first_name) = first_company(&db);

    let engine = start_engine(&db).await;
    let http = reqwest::Client::new();

    let health: Value = http
        .get(engine.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok"}));

    let body = json!({"table": "companies", "query": first_name, "mode": "fulltext"});
    let first: Value = http
        .post(engine.url("/search"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["from_cache"], false);
    let results = first["results"].as_array().unwrap();
    assert!(!results.is_empty() && results.len() <= 60);
    assert!(results.iter().all(|r| r.get("id").is_some()));
    assert!(results.iter().any(|r| r["id"] == first_id));

    let repeat: Value = http
        .post(engine.url("/search"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(repeat["from_cache"], true);
    assert_eq!(repeat["results"], first["results"]);

    let via_get: Value = http
        .get(engine.url("/search"))
        .query(&[("q", first_name.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(via_get["results"], first["results"]);

    let missing = http
        .post(engine.url("/search"))
        .json(&json!({"table": "companies"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 400);

    let unknown = http
        .post(engine.url("/search"))
        .json(&json!({"table": "nope", "query": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status().as_u16(), 404);

    engine.stop().await;
}

#[tokio::test]
async fn test_core_client_reads_engine_ranking() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("engine.db");
    seed_database(&db, 30).await;
    index_companies(&db);
    let (first_id, first_name) = first_company(&db);

    let engine = start_engine(&db).await;
    let client =
        EngineClient::with_base_url(engine.url(""), &ServiceConfig::default()).unwrap();

    let result = client.query("companies", &first_name).await.unwrap();
    assert!(result.ids.contains(&EntityId::Int(first_id)));
    assert_eq!(result.count, result.ids.len());

    engine.stop().await;
}
