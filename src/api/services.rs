use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    error::ApiError,
    models::{EntriesResponse, FindQuery, FindResponse, HealthResponse},
    state::AppState,
    utils,
};

/// Key lines buffered before a chunk is handed to the response body
const KEYS_CHUNK_BYTES: usize = 16 * 1024;
const KEYS_CHANNEL_CAPACITY: usize = 8;

fn text_plain() -> [(header::HeaderName, String); 1] {
    [(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.to_string())]
}

/// Stats endpoint (GET /)
///
/// Plain-text dump of engine statistics, ingestion counters and the current
/// retention sweeper phase.
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.stat_snapshot();
    let metrics = state.metrics.snapshot();
    let phase = *state.sweeper_phase.borrow();

    let body = format!(
        "{}\n\n[store]\n{store}\n\n[ingest]\n{metrics}\n\n[retention]\nphase: {phase}\n",
        state.ident
    );

    (text_plain(), body)
}

/// Entry lookup (GET /get/{id})
///
/// `{id}.{seq}` narrows the result to entries whose `seq` attribute is
/// absent or equal. 404 only when nothing at all is stored for the id.
pub async fn get_entries(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let (id, seq) = utils::split_entry_filter(&raw);

    let mut entries = state.store.get_by_entry_id(id)?;
    if entries.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no entries found for id {id}"
        )));
    }

    if let Some(seq) = seq {
        entries.retain(|entry| utils::matches_seq(entry, seq));
    }

    Ok(Json(EntriesResponse {
        id: id.to_string(),
        entries,
    }))
}

/// Message-id search (GET /find?messageId=...)
pub async fn find(
    State(state): State<AppState>,
    Query(query): Query<FindQuery>,
) -> Result<Json<FindResponse>, ApiError> {
    let message_id = query
        .message_id
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidQuery("messageId is required".to_string()))?;

    let entries = state.store.find_by_message_id(&message_id)?;
    if entries.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no entries found for message id {message_id}"
        )));
    }

    Ok(Json(FindResponse {
        message_id,
        entries,
    }))
}

/// Key dump (GET /keys)
///
/// Streams one key per line, ending with `Listed N keys in Xs.` or, when the
/// scan fails midway, with the bracketed error. Iteration runs on the
/// blocking pool and stops as soon as the client disconnects.
pub async fn list_keys(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(KEYS_CHANNEL_CAPACITY);
    let store = state.store.clone();

    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let mut count = 0usize;
        let mut chunk = String::with_capacity(KEYS_CHUNK_BYTES);

        for item in store.list_keys() {
            match item {
                Ok(key) => {
                    count += 1;
                    chunk.push_str(&key);
                    chunk.push('\n');
                }
                Err(err) => {
                    let _ = write!(chunk, "[{err}]");
                    let _ = tx.blocking_send(Ok(Bytes::from(chunk)));
                    return;
                }
            }

            if chunk.len() >= KEYS_CHUNK_BYTES {
                let full = std::mem::replace(&mut chunk, String::with_capacity(KEYS_CHUNK_BYTES));
                if tx.blocking_send(Ok(Bytes::from(full))).is_err() {
                    debug!(count, "Key listing abandoned by client");
                    return;
                }
            }
        }

        let _ = write!(
            chunk,
            "Listed {count} keys in {:.3}s.",
            started.elapsed().as_secs_f64()
        );
        let _ = tx.blocking_send(Ok(Bytes::from(chunk)));
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    (text_plain(), Body::from_stream(stream)).into_response()
}

/// Health check endpoint (GET /health)
///
/// Returns 503 once the store has started closing.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();

    let ledger = if state.store.is_closing() {
        "closing"
    } else {
        "healthy"
    };
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("ledger".to_string(), ledger.to_string());
    components.insert(
        "retention".to_string(),
        state.sweeper_phase.borrow().to_string(),
    );

    let all_healthy = ledger == "healthy";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
