//! HTTP client for the external search engine.

use super::protocol::{
    BackendFault, EngineQueryResult, EngineSearchRequest, EngineSearchResponse, FaultKind,
    QueryKind,
};
use super::EngineBackend;
use crate::config::ServiceConfig;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Instant;
use tracing::debug;

/// reqwest-backed engine client.
///
/// Every request is bounded by the configured service timeout. No retries.
#[derive(Debug, Clone)]
pub struct EngineClient {
    client: Client,
    base_url: String,
}

impl EngineClient {
    pub fn new(service: &ServiceConfig) -> Result<Self> {
        Self::with_base_url(service.base_url(), service)
    }

    /// Client pointed at an explicit base URL (tests, proxies).
    pub fn with_base_url(base_url: impl Into<String>, service: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(service.timeout())
            .user_agent(concat!("lightning-search/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

async fn decode(response: Response) -> std::result::Result<EngineQueryResult, BackendFault> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body
        };
        return Err(BackendFault::new(FaultKind::Status(status.as_u16()), message));
    }

    let body: EngineSearchResponse = response
        .json()
        .await
        .map_err(|e| BackendFault::new(FaultKind::Decode, e.to_string()))?;
    body.into_result()
}

#[async_trait]
impl EngineBackend for EngineClient {
    async fn query(
        &self,
        table: &str,
        query_text: &str,
    ) -> std::result::Result<EngineQueryResult, BackendFault> {
        let request = EngineSearchRequest {
            table: table.to_string(),
            query: query_text.to_string(),
            mode: QueryKind::Fulltext,
        };
        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&request)
            .send()
            .await?;
        let result = decode(response).await?;
        debug!(
            "POST search on {} returned {} ids in {:?}",
            table,
            result.ids.len(),
            started.elapsed()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn service() -> ServiceConfig {
        ServiceConfig {
            timeout: 2,
            ..ServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_post_query_returns_ranked_ids() {
        let router = Router::new().route(
            "/search",
            axum::routing::post(|Json(body): Json<Value>| async move {
                assert_eq!(body["mode"], "fulltext");
                Json(json!({
                    "results": [{"id": 3}, {"id": 1}],
                    "count": 2,
                    "time_ms": 7,
                    "from_cache": true
                }))
            }),
        );
        let client = EngineClient::with_base_url(serve(router).await, &service()).unwrap();
        let result = client.query("companies", "lon").await.unwrap();
        assert_eq!(
            result.ids,
            vec![crate::store::EntityId::Int(3), crate::store::EntityId::Int(1)]
        );
        assert!(result.from_cache);
    }

    #[tokio::test]
    async fn test_status_failure_is_fault() {
        let router = Router::new().route(
            "/search",
            axum::routing::post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let client = EngineClient::with_base_url(serve(router).await, &service()).unwrap();
        let fault = client.query("companies", "lon").await.unwrap_err();
        assert_eq!(fault.status(), Some(503));
        assert_eq!(fault.message, "busy");
    }

    #[tokio::test]
    async fn test_null_results_are_an_empty_ranking() {
        let router = Router::new().route(
            "/search",
            axum::routing::post(|| async {
                Json(json!({"results": null, "count": 0, "time_ms": 1, "from_cache": false}))
            }),
        );
        let client = EngineClient::with_base_url(serve(router).await, &service()).unwrap();
        let result = client.query("companies", "zzz").await.unwrap();
        assert!(result.ids.is_empty());
        assert_eq!(result.count, 0);
    }

    #[tokio::test]
    async fn test_timeout_is_fault() {
        let router = Router::new().route(
            "/search",
            axum::routing::post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"results": [], "count": 0, "time_ms": 0}))
            }),
        );
        let config = ServiceConfig {
            timeout: 1,
            ..ServiceConfig::default()
        };
        let client = EngineClient::with_base_url(serve(router).await, &config).unwrap();
        let fault = client.query("companies", "lon").await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused_is_fault() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            EngineClient::with_base_url(format!("http://{}", addr), &service()).unwrap();
        let fault = client.query("companies", "lon").await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Connect);
    }
}
