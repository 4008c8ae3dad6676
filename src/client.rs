//! Typesense HTTP client.
//!
//! [`TypesenseClient`] implements [`SearchBackend`] over the Typesense REST
//! API using `reqwest`. Every request carries the `X-TYPESENSE-API-KEY`
//! header and is bounded by the connection timeout, so an abandoned call
//! always resolves.
//!
//! # Endpoints
//!
//! | Method | Path |
//! |--------|------|
//! | `health` | `GET /health` |
//! | `list_indexes` | `GET /collections` |
//! | `get_index` | `GET /collections/{name}` |
//! | `list_aliases` | `GET /aliases` |
//! | `search` | `GET /collections/{name}/documents/search` |
//! | `upsert_document` | `POST /collections/{name}/documents?action=upsert` |
//! | `delete_document` | `DELETE /collections/{name}/documents/{id}` |
//!
//! # Error mapping
//!
//! | Response | [`BackendError`] |
//! |----------|------------------|
//! | 404 | `NotFound` |
//! | 401, 403 | `Unauthorized` |
//! | any other non-2xx | `Rejected` |
//! | connect failure, timeout | `Transport` |
//! | undecodable body | `Decode` |
//!
//! There are no retries.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{Config, ConnectionConfig};
use ts_lens_core::backend::SearchBackend;
use ts_lens_core::error::BackendError;
use ts_lens_core::models::{Alias, Document, IndexSchema, SearchParameters, SearchResponse};

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

pub struct TypesenseClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    ok: bool,
}

#[derive(Deserialize)]
struct AliasesResponse {
    #[serde(default)]
    aliases: Vec<Alias>,
}

impl TypesenseClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(url.trim()).with_context(|| format!("Invalid server URL: {}", url))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            bail!("Server URL must be http:// or https://: {}", url);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            api_key: api_key.to_string(),
        })
    }

    pub fn from_connection(conn: &ConnectionConfig) -> Result<Self> {
        let api_key = conn.api_key()?;
        Self::new(&conn.url, &api_key, conn.timeout())
    }

    /// Client for the connection named `name`, or the default connection.
    pub fn from_config(config: &Config, name: Option<&str>) -> Result<Self> {
        let (name, conn) = config.connection(name)?;
        let client = Self::from_connection(conn)
            .with_context(|| format!("Failed to open connection '{}'", name))?;
        tracing::debug!(connection = name, node = %client.node(), "using connection");
        Ok(client)
    }

    /// `host:port` of the server; the port defaults by scheme.
    pub fn node(&self) -> String {
        format!(
            "{}:{}",
            self.base.host_str().unwrap_or_default(),
            self.base.port_or_known_default().unwrap_or(80)
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport)?;
        tracing::debug!(url = %response.url(), status = %response.status(), "typesense response");
        decode(response).await
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    let message = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else {
        err.to_string()
    };
    BackendError::Transport { message }
}

/// Pull `message` out of a Typesense error body, falling back to the raw
/// body or the status reason.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
        .or_else(|| {
            let body = body.trim();
            (!body.is_empty()).then(|| body.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

fn status_error(status: reqwest::StatusCode, body: &str) -> BackendError {
    let message = error_message(status, body);
    match status.as_u16() {
        404 => BackendError::NotFound { message },
        401 | 403 => BackendError::Unauthorized { message },
        code => BackendError::Rejected {
            status: code,
            message,
        },
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    serde_json::from_str(&body).map_err(|e| BackendError::Decode {
        message: e.to_string(),
    })
}

#[async_trait]
impl SearchBackend for TypesenseClient {
    async fn health(&self) -> Result<bool, BackendError> {
        let health: HealthResponse = self.send(self.http.get(self.endpoint(&["health"]))).await?;
        Ok(health.ok)
    }

    async fn list_indexes(&self) -> Result<Vec<IndexSchema>, BackendError> {
        self.send(self.http.get(self.endpoint(&["collections"])))
            .await
    }

    async fn get_index(&self, name: &str) -> Result<IndexSchema, BackendError> {
        self.send(self.http.get(self.endpoint(&["collections", name])))
            .await
    }

    async fn list_aliases(&self) -> Result<Vec<Alias>, BackendError> {
        let resp: AliasesResponse = self.send(self.http.get(self.endpoint(&["aliases"]))).await?;
        Ok(resp.aliases)
    }

    async fn search(
        &self,
        index: &str,
        params: &SearchParameters,
    ) -> Result<SearchResponse, BackendError> {
        let url = self.endpoint(&["collections", index, "documents", "search"]);
        self.send(self.http.get(url).query(params)).await
    }

    async fn upsert_document(
        &self,
        index: &str,
        document: &Document,
    ) -> Result<Document, BackendError> {
        let url = self.endpoint(&["collections", index, "documents"]);
        self.send(
            self.http
                .post(url)
                .query(&[("action", "upsert")])
                .json(document),
        )
        .await
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<Document, BackendError> {
        let url = self.endpoint(&["collections", index, "documents", id]);
        self.send(self.http.delete(url)).await
    }
}
