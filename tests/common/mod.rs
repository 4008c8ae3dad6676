//! A small stand-in for a Typesense server, built on axum.
//!
//! Serves one collection (`books_v2`) with two documents, two aliases
//! (`books`, and a broken `old`), and records every request it sees.
//! Queries starting with `slow` are answered after a delay.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

pub const API_KEY: &str = "secret";
pub const SLOW_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub api_key: Option<String>,
}

#[derive(Clone, Default)]
struct Shared {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

pub struct MockTypesense {
    pub url: String,
    shared: Shared,
    task: JoinHandle<()>,
}

impl MockTypesense {
    pub async fn start() -> Self {
        let shared = Shared::default();
        let app = Router::new()
            .route("/health", get(health))
            .route("/collections", get(collections))
            .route("/collections/{name}", get(collection))
            .route("/aliases", get(aliases))
            .route("/collections/{name}/documents/search", get(search))
            .route("/collections/{name}/documents", post(upsert))
            .route("/collections/{name}/documents/{id}", delete(remove))
            .layer(middleware::from_fn_with_state(shared.clone(), record_and_auth))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{}", addr),
            shared,
            task,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.shared.requests.lock().unwrap().clone()
    }

    /// `q` of every search request, in arrival order.
    pub fn queries(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.ends_with("/documents/search"))
            .filter_map(|r| r.query.get("q").cloned())
            .collect()
    }
}

impl Drop for MockTypesense {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

async fn record_and_auth(State(shared): State<Shared>, req: Request, next: Next) -> Response {
    let query = req
        .uri()
        .query()
        .map(|q| {
            url_pairs(q)
                .into_iter()
                .collect::<HashMap<String, String>>()
        })
        .unwrap_or_default();
    let api_key = req
        .headers()
        .get("x-typesense-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    shared.requests.lock().unwrap().push(Recorded {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        query,
        api_key: api_key.clone(),
    });
    if api_key.as_deref() != Some(API_KEY) {
        return error(
            StatusCode::UNAUTHORIZED,
            "Forbidden - a valid `x-typesense-api-key` header must be sent.",
        );
    }
    next.run(req).await
}

fn url_pairs(query: &str) -> Vec<(String, String)> {
    reqwest::Url::parse(&format!("http://x/?{}", query))
        .map(|u| u.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

fn schema() -> Value {
    json!({
        "name": "books_v2",
        "num_documents": 2,
        "created_at": 1700000000,
        "fields": [
            {"name": "title", "type": "string"},
            {"name": "author", "type": "string", "facet": true},
            {"name": "year", "type": "int32"},
            {"name": "tags", "type": "string[]"}
        ]
    })
}

fn documents() -> Vec<Value> {
    vec![
        json!({"id": "1", "title": "Slow River", "author": "Marc Levy", "year": 1999, "tags": ["river", "water"]}),
        json!({"id": "2", "title": "Fast Car", "author": "Anne Rice", "year": 2005, "tags": ["car"]}),
    ]
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn collections() -> Json<Value> {
    Json(json!([schema()]))
}

async fn collection(Path(name): Path<String>) -> Response {
    if name == "books_v2" {
        Json(schema()).into_response()
    } else {
        error(StatusCode::NOT_FOUND, "Not Found")
    }
}

async fn aliases() -> Json<Value> {
    Json(json!({
        "aliases": [
            {"name": "books", "collection_name": "books_v2"},
            {"name": "old", "collection_name": "books_v1"}
        ]
    }))
}

fn highlights(doc: &Value, q: &str) -> Vec<Value> {
    let mut out = Vec::new();
    let title = doc["title"].as_str().unwrap_or_default();
    if let Some(pos) = title.to_lowercase().find(q) {
        let end = pos + q.len();
        out.push(json!({
            "field": "title",
            "snippet": format!("{}<mark>{}</mark>{}", &title[..pos], &title[pos..end], &title[end..]),
            "matched_tokens": [&title[pos..end]]
        }));
    }
    let tags: Vec<&str> = doc["tags"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if tags.iter().any(|t| t.contains(q)) {
        let tokens: Vec<Vec<&str>> = tags
            .iter()
            .map(|t| if t.contains(q) { vec![*t] } else { Vec::new() })
            .collect();
        let snippets: Vec<String> = tags
            .iter()
            .map(|t| {
                if t.contains(q) {
                    format!("<mark>{}</mark>", t)
                } else {
                    t.to_string()
                }
            })
            .collect();
        out.push(json!({ "field": "tags", "matched_tokens": tokens, "snippets": snippets }));
    }
    out
}

async fn search(Path(name): Path<String>, Query(params): Query<HashMap<String, String>>) -> Response {
    if name != "books_v2" {
        return error(
            StatusCode::NOT_FOUND,
            &format!("Could not find a collection with name `{}`.", name),
        );
    }
    if params.get("query_by").map_or(true, |q| q.is_empty()) {
        return error(StatusCode::BAD_REQUEST, "Parameter `query_by` is required.");
    }
    if params.get("filter_by").map(String::as_str) == Some("bad:") {
        return error(StatusCode::BAD_REQUEST, "Could not parse the filter query.");
    }
    let q = params.get("q").cloned().unwrap_or_default().to_lowercase();
    if q.starts_with("slow") {
        tokio::time::sleep(SLOW_DELAY).await;
    }

    let hits: Vec<Value> = documents()
        .into_iter()
        .filter_map(|doc| {
            if q == "*" {
                return Some(json!({ "document": doc, "text_match": 0, "highlights": [] }));
            }
            let highlights = highlights(&doc, &q);
            (!highlights.is_empty()).then(|| {
                json!({ "document": doc, "text_match": 100, "highlights": highlights })
            })
        })
        .collect();
    let page: u32 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    Json(json!({
        "found": hits.len(),
        "out_of": 2,
        "page": page,
        "search_time_ms": 1,
        "hits": hits
    }))
    .into_response()
}

async fn upsert(
    Path(_name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    Json(doc): Json<Value>,
) -> Response {
    if params.get("action").map(String::as_str) != Some("upsert") {
        return error(StatusCode::CONFLICT, "A document with id already exists.");
    }
    Json(doc).into_response()
}

async fn remove(Path((_name, id)): Path<(String, String)>) -> Response {
    if id == "missing" {
        return error(
            StatusCode::NOT_FOUND,
            &format!("Could not find a document with id: {}", id),
        );
    }
    Json(json!({ "id": id })).into_response()
}
