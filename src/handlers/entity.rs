//! Entity handlers: thin adapters from HTTP requests to `EntityService` calls.

use crate::config::{ColumnInfo, ResolvedEntity};
use crate::error::AppError;
use crate::query::{FilterRequest, FilterSpec};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Body of `PATCH /:entity`.
#[derive(Debug, Deserialize)]
pub struct UpdateManyBody {
    #[serde(default, rename = "where")]
    pub where_: FilterSpec,
    pub data: Value,
}

/// Body of `POST /:entity/increment`.
#[derive(Debug, Deserialize)]
pub struct IncrementBody {
    #[serde(default, rename = "where")]
    pub where_: FilterSpec,
    pub values: Map<String, Value>,
}

/// Path values are text; typed key columns get a JSON number or bool when they parse as one.
fn typed_value(column: &ColumnInfo, raw: &str) -> Value {
    let ty = column.pg_type.as_deref().map(str::to_lowercase).unwrap_or_default();
    if ty.contains("int") || ty.contains("serial") {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if ty.starts_with("bool") {
        if raw.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
    }
    Value::String(raw.to_string())
}

/// Primary key from the path. Composite keys are comma-separated in key order.
fn path_key(entity: &ResolvedEntity, id: &str) -> Result<Value, AppError> {
    let primary: Vec<&ColumnInfo> = entity.primary_columns().collect();
    let parts: Vec<&str> = if primary.len() == 1 { vec![id] } else { id.split(',').collect() };
    if parts.len() != primary.len() || parts.iter().any(|p| p.is_empty()) {
        return Err(AppError::BadRequest(format!(
            "{} key needs {} value(s)",
            entity.name,
            primary.len()
        )));
    }
    let key: Map<String, Value> = primary
        .iter()
        .zip(parts)
        .map(|(c, raw)| (c.property.clone(), typed_value(c, raw)))
        .collect();
    Ok(Value::Object(key))
}

pub async fn list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service(&entity)?;
    let request = FilterRequest::from_query_params(&params)?;
    let page = service.list(&request, service.options()).await?;
    Ok(Json(page))
}

pub async fn query(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(request): Json<FilterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service(&entity)?;
    let rows = service.find(&request, service.options()).await?;
    Ok(Json(rows))
}

/// Query-string `populates`/`fields` apply; `where` is the path key.
pub async fn read(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service(&entity)?;
    let key = path_key(service.entity(), &id)?;
    let mut request = FilterRequest::from_query_params(&params)?;
    request.where_ = match key {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    request.page = None;
    request.page_size = None;
    let row = service.find_one_or_fail(&request, service.options()).await?;
    Ok(Json(row))
}

pub async fn create(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let row = state.service(&entity)?.create(body).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn bulk_create(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let items = match body {
        Value::Array(items) => items,
        _ => return Err(AppError::BadRequest("body must be a JSON array".into())),
    };
    let rows = state.service(&entity)?.bulk_create(items).await?;
    Ok((StatusCode::CREATED, Json(rows)))
}

pub async fn update(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service(&entity)?;
    let key = path_key(service.entity(), &id)?;
    Ok(Json(service.update(&key, body).await?))
}

pub async fn replace(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service(&entity)?.replace(body).await?))
}

pub async fn update_many(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(body): Json<UpdateManyBody>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service(&entity)?.update_many(body.where_, body.data).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service(&entity)?;
    let key = path_key(service.entity(), &id)?;
    Ok(Json(service.delete(&key).await?))
}

pub async fn soft_delete(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service(&entity)?;
    let key = path_key(service.entity(), &id)?;
    Ok(Json(service.soft_delete(&key).await?))
}

pub async fn delete_many(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(criteria): Json<FilterSpec>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service(&entity)?.delete_many(criteria).await?))
}

pub async fn increment(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(body): Json<IncrementBody>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service(&entity)?.increment(body.where_, body.values).await?))
}
