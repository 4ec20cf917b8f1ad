//! Router tests: drive the entity routes with `oneshot` over a scripted executor.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use crud_query_sdk::sql::{Dialect, QueryBuf};
use crud_query_sdk::{
    common_routes, entity_routes, entity_routes_with_limit, resolve, AppState, BackendError, BackendErrorKind,
    BackendExecutor, ModelConfig, Row,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Default)]
struct Scripted {
    sql: Mutex<Vec<String>>,
    answers: Mutex<VecDeque<Result<Vec<Row>, BackendError>>>,
}

impl Scripted {
    fn new(answers: Vec<Result<Value, BackendError>>) -> Arc<Self> {
        let answers = answers
            .into_iter()
            .map(|a| {
                a.map(|rows| {
                    rows.as_array()
                        .unwrap()
                        .iter()
                        .map(|r| r.as_object().unwrap().clone())
                        .collect()
                })
            })
            .collect();
        Arc::new(Scripted {
            answers: Mutex::new(answers),
            ..Default::default()
        })
    }

    fn statements(&self) -> Vec<String> {
        self.sql.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendExecutor for Scripted {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, BackendError> {
        self.sql.lock().unwrap().push(q.sql.clone());
        self.answers.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, BackendError> {
        self.sql.lock().unwrap().push(q.sql.clone());
        Ok(3)
    }
}

fn model_config() -> ModelConfig {
    serde_json::from_value(json!({
        "entities": [
            {
                "name": "users",
                "columns": [
                    {"name": "id", "type": "int8", "primary": true, "has_default": true},
                    {"name": "name"},
                    {"name": "email"},
                    {"name": "visits", "type": "int4"},
                    {"name": "deletedAt", "type": "timestamptz", "delete_date": true}
                ],
                "relations": [
                    {"property": "posts", "target": "posts", "cardinality": "many",
                     "local_column": "id", "foreign_column": "authorId"}
                ],
                "populations": [
                    {"property": "posts", "type": "relation"}
                ],
                "max_page_size": 25
            },
            {
                "name": "posts",
                "columns": [
                    {"name": "id", "type": "int8", "primary": true},
                    {"name": "authorId", "type": "int8"},
                    {"name": "title"}
                ]
            }
        ],
        "constraint_messages": {"users_email_key": "Email already registered"}
    }))
    .unwrap()
}

fn app(exec: Arc<Scripted>) -> Router {
    let model = Arc::new(resolve(&model_config()).unwrap());
    let state = AppState::new(model, exec).unwrap();
    common_routes().merge(entity_routes(state))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => {
            let text = b.to_string();
            builder
                .header("content-type", "application/json")
                .header("content-length", text.len())
                .body(Body::from(text))
                .unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_and_version() {
    let (status, body) = send(app(Scripted::new(vec![])), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, body) = send(app(Scripted::new(vec![])), "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("crud-query-sdk"));
}

#[tokio::test]
async fn list_returns_page_envelope() {
    let exec = Scripted::new(vec![
        Ok(json!([
            {"users__id": 2, "users__name": "Bo", "users__email": "b@x.io", "users__visits": 1},
            {"users__id": 1, "users__name": "Al", "users__email": "a@x.io", "users__visits": 4}
        ])),
        Ok(json!([{"total": 2}])),
    ]);
    let uri = "/users?where=%7B%22visits%22%3A%7B%22%24gte%22%3A1%7D%7D&pageSize=10";
    let (status, body) = send(app(exec.clone()), "GET", uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(2));
    assert_eq!(body["count"], json!(2));
    assert_eq!(body["pageSize"], json!(10));
    assert_eq!(body["pageCount"], json!(1));
    assert_eq!(
        body["data"][0],
        json!({"id": 2, "name": "Bo", "email": "b@x.io", "visits": 1, "deletedAt": null})
    );

    let sql = exec.statements();
    assert!(sql[0].contains("\"users\".\"visits\" >= $1::int4"));
    assert!(sql[0].contains("\"users\".\"deletedAt\" IS NULL"));
    assert!(sql[0].ends_with("LIMIT 10"));
}

#[tokio::test]
async fn unsupported_operator_is_bad_request() {
    let exec = Scripted::new(vec![]);
    let uri = "/users?where=%7B%22name%22%3A%7B%22%24regex%22%3A%22a%22%7D%7D";
    let (status, body) = send(app(exec.clone()), "GET", uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], json!(400));
    assert_eq!(body["message"], json!("Operator $regex Not Supported"));
    assert!(exec.statements().is_empty());
}

#[tokio::test]
async fn unknown_entity_is_not_found() {
    let (status, _) = send(app(Scripted::new(vec![])), "GET", "/ghosts", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn read_by_id_populates_relation() {
    let exec = Scripted::new(vec![Ok(json!([
        {"users__id": 7, "users__name": "Al", "posts__id": 1, "posts__title": "first"},
        {"users__id": 7, "users__name": "Al", "posts__id": 2, "posts__title": "second"}
    ]))]);
    let uri = "/users/7?populates=%5B%22posts%22%5D&fields=name,posts.title";
    let (status, body) = send(app(exec.clone()), "GET", uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"id": 7, "name": "Al", "posts": [{"id": 1, "title": "first"}, {"id": 2, "title": "second"}]})
    );
    assert!(exec.statements()[0].contains("LEFT JOIN \"posts\" \"posts\""));
}

#[tokio::test]
async fn read_missing_row_is_not_found() {
    let (status, body) = send(app(Scripted::new(vec![Ok(json!([]))])), "GET", "/users/9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], json!("USERS NOT FOUND"));
}

#[tokio::test]
async fn create_returns_created_row() {
    let exec = Scripted::new(vec![Ok(json!([{"id": 5, "name": "Cy", "email": "c@x.io"}]))]);
    let (status, body) = send(app(exec.clone()), "POST", "/users", Some(json!({"name": "Cy", "email": "c@x.io"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], json!(5));
    assert!(exec.statements()[0].starts_with("INSERT INTO \"users\""));
}

#[tokio::test]
async fn duplicate_email_is_conflict() {
    let exec = Scripted::new(vec![Err(BackendError::constraint(
        BackendErrorKind::UniqueViolation,
        "users_email_key",
        "Key (email)=(c@x.io) already exists.",
    ))]);
    let (status, body) = send(app(exec), "POST", "/users", Some(json!({"email": "c@x.io"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], json!("Email already registered"));
}

#[tokio::test]
async fn bulk_create_requires_array() {
    let (status, _) = send(app(Scripted::new(vec![])), "POST", "/users/bulk", Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn increment_reports_affected() {
    let exec = Scripted::new(vec![]);
    let body = json!({"where": {"name": "Al"}, "values": {"visits": 1}});
    let (status, out) = send(app(exec.clone()), "POST", "/users/increment", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out, json!({"success": true, "affected": 3}));
    assert!(exec.statements()[0].starts_with("UPDATE \"users\" SET \"visits\" = \"visits\" + $1::int4 WHERE"));
}

#[tokio::test]
async fn soft_delete_sets_delete_column() {
    let exec = Scripted::new(vec![Ok(json!([{"id": 7, "name": "Al", "deletedAt": "2026-01-01T00:00:00Z"}]))]);
    let (status, _) = send(app(exec.clone()), "DELETE", "/users/7/soft", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(exec.statements()[0].starts_with("UPDATE \"users\" SET \"deletedAt\" = CURRENT_TIMESTAMP"));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let model = Arc::new(resolve(&model_config()).unwrap());
    let state = AppState::new(model, Scripted::new(vec![])).unwrap();
    let app = entity_routes_with_limit(state, 16);
    let (status, _) = send(app, "POST", "/users", Some(json!({"name": "a name longer than sixteen bytes"}))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
