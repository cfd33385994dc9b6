//! `GET|PUT|DELETE /v0/entity`: the single external (and, one hop in, internal) resource
//! this service exposes.

use crate::http::error::ApiError;
use crate::http::query::{EntityQuery, Replicas, X_LAST_MODIFIED, X_REPLICATED};
use crate::http::AppState;
use crate::record::{format_timestamp, parse_timestamp};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;

fn is_replicated(headers: &HeaderMap) -> bool {
    headers
        .get(X_REPLICATED)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

/// External requests honor `replicas=ack/from`; the internal replication hop always
/// addresses exactly the local node and ignores it entirely.
fn resolve_replicas(query: &EntityQuery, replicated: bool) -> Result<Replicas, ApiError> {
    if replicated {
        Ok(Replicas::DEFAULT)
    } else {
        query.replicas()
    }
}

pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntityQuery>,
    headers: HeaderMap,
) -> Response {
    match get_entity_inner(state, query, headers).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn get_entity_inner(
    state: Arc<AppState>,
    query: EntityQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let key = query.key_bytes()?;
    let replicated = is_replicated(&headers);
    let replicas = resolve_replicas(&query, replicated)?;

    let record = state
        .coordinator
        .get(key, replicas.ack, replicas.from, replicated)
        .await?;

    let mut response = (StatusCode::OK, record.value.clone().unwrap_or_default()).into_response();
    if let Ok(value) = format_timestamp(record.timestamp).parse() {
        response.headers_mut().insert(X_LAST_MODIFIED, value);
    }
    Ok(response)
}

pub async fn put_entity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntityQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match put_entity_inner(state, query, headers, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn put_entity_inner(
    state: Arc<AppState>,
    query: EntityQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let key = query.key_bytes()?;
    let replicated = is_replicated(&headers);
    let replicas = resolve_replicas(&query, replicated)?;
    let timestamp = inbound_timestamp(&headers).unwrap_or_else(Utc::now);

    state
        .coordinator
        .upsert(
            key,
            Some(body.to_vec()),
            replicas.ack,
            replicas.from,
            timestamp,
            replicated,
        )
        .await?;

    Ok(StatusCode::CREATED.into_response())
}

pub async fn delete_entity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntityQuery>,
    headers: HeaderMap,
) -> Response {
    match delete_entity_inner(state, query, headers).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn delete_entity_inner(
    state: Arc<AppState>,
    query: EntityQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let key = query.key_bytes()?;
    let replicated = is_replicated(&headers);
    let replicas = resolve_replicas(&query, replicated)?;
    let timestamp = inbound_timestamp(&headers).unwrap_or_else(Utc::now);

    state
        .coordinator
        .upsert(key, None, replicas.ack, replicas.from, timestamp, replicated)
        .await?;

    Ok(StatusCode::ACCEPTED.into_response())
}

fn inbound_timestamp(headers: &HeaderMap) -> Option<chrono::DateTime<Utc>> {
    headers
        .get(X_LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_timestamp)
}
