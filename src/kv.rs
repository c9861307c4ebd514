use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use tracing::debug;

use crate::{
    error::Result,
    models::{
        parse_duration_ns, AcquireQuery, AcquireResponse, GetManyRequest, GetManyResponse,
        GetResponse, KeysQuery, SessionQuery, SetManyRequest, SetQuery, StatusResponse,
        SuccessResponse,
    },
};

pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse { running: true })
}

pub async fn list_keys(
    Query(query): Query<KeysQuery>,
    State(state): State<crate::AppState>,
) -> Json<Vec<String>> {
    Json(state.store.keys(&query.prefix))
}

pub async fn acquire(
    Path((key, duration)): Path<(String, String)>,
    Query(query): Query<AcquireQuery>,
    State(state): State<crate::AppState>,
) -> Result<Json<AcquireResponse>> {
    let ttl = parse_duration_ns(&duration)?;

    let response = match state.store.acquire(&key, &query.value, ttl) {
        Some(session_id) => AcquireResponse {
            session_id,
            success: true,
        },
        None => AcquireResponse {
            session_id: String::new(),
            success: false,
        },
    };
    Ok(Json(response))
}

pub async fn release(
    Path((key, session_id)): Path<(String, String)>,
    State(state): State<crate::AppState>,
) -> Json<SuccessResponse> {
    let success = state.store.release(&key, &session_id);
    Json(SuccessResponse { success })
}

pub async fn set(
    Path(key): Path<String>,
    Query(query): Query<SetQuery>,
    State(state): State<crate::AppState>,
) -> Json<SuccessResponse> {
    let success = state.store.set(&key, &query.value, &query.session_id);
    debug!("Set {} (session {:?}): {}", key, query.session_id, success);
    Json(SuccessResponse { success })
}

pub async fn get(Path(key): Path<String>, State(state): State<crate::AppState>) -> Json<GetResponse> {
    let value = state.store.get(&key);
    Json(GetResponse {
        success: value.is_some(),
        key,
        value: value.unwrap_or_default(),
    })
}

// Batch bodies are decoded by hand: clients send them on GET without a JSON content type.
pub async fn get_many(State(state): State<crate::AppState>, body: Bytes) -> Result<Json<GetManyResponse>> {
    let req: GetManyRequest = serde_json::from_slice(&body)?;
    Ok(Json(GetManyResponse {
        entries: state.store.get_many(&req.keys),
    }))
}

pub async fn set_many(
    Query(query): Query<SessionQuery>,
    State(state): State<crate::AppState>,
    body: Bytes,
) -> Result<Json<SuccessResponse>> {
    let req: SetManyRequest = serde_json::from_slice(&body)?;
    let success = state.store.set_many(&req.entries, &query.session_id);
    debug!("Batch set of {} entries: {}", req.entries.len(), success);
    Ok(Json(SuccessResponse { success }))
}
