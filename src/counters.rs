//! Integer counters stored as decimal strings in the key-value store.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{AppError, Result},
    store::{KeyEntry, KvStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntOp {
    Inc,
    Dec,
    Set,
    Get,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntQuery {
    #[serde(default)]
    pub session_id: String,
    pub op: IntOp,
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntResponse {
    pub value: i64,
    pub success: bool,
    pub op: IntOp,
}

impl KvStore {
    /// Applies a counter operation to `key`.
    ///
    /// `inc`, `dec` and `set` are refused (`Ok(None)`) when the key is locked
    /// by a session other than `session_id`. A missing key counts as zero and
    /// is created by any operation that gets past the ownership check.
    pub fn int_op(
        &self,
        key: &str,
        op: IntOp,
        session_id: &str,
        value: Option<i64>,
    ) -> Result<Option<i64>> {
        if op == IntOp::Set && value.is_none() {
            return Err(AppError::InvalidInput("op=set requires a value".to_string()));
        }

        let mut state = self.state.write();

        if op != IntOp::Get {
            let locked = state.entries.get(key).is_some_and(|entry| entry.locked);
            if locked && !state.owns(key, session_id) {
                debug!("Counter {:?} on {} rejected for session {:?}", op, key, session_id);
                return Ok(None);
            }
        }

        let entry = state
            .entries
            .entry(key.to_string())
            .or_insert_with(|| KeyEntry::unlocked("0"));

        let next = match op {
            IntOp::Set => value.unwrap_or_default(),
            IntOp::Get => parse_counter(key, &entry.value)?,
            IntOp::Inc => parse_counter(key, &entry.value)?
                .checked_add(1)
                .ok_or_else(|| AppError::CounterOverflow { key: key.to_string() })?,
            IntOp::Dec => parse_counter(key, &entry.value)?
                .checked_sub(1)
                .ok_or_else(|| AppError::CounterOverflow { key: key.to_string() })?,
        };
        // A read only fills in an empty value; anything else stays as written.
        if op != IntOp::Get || entry.value.is_empty() {
            entry.value = next.to_string();
        }

        Ok(Some(next))
    }
}

fn parse_counter(key: &str, stored: &str) -> Result<i64> {
    if stored.is_empty() {
        return Ok(0);
    }
    stored.parse().map_err(|_| AppError::CorruptCounter {
        key: key.to_string(),
        value: stored.to_string(),
    })
}

// ── Route handlers ──────────────────────────────────────────────────────

pub async fn int_op(
    Path(key): Path<String>,
    query: std::result::Result<Query<IntQuery>, QueryRejection>,
    State(state): State<crate::AppState>,
) -> Result<Json<IntResponse>> {
    let Query(query) = query.map_err(|rejection| AppError::InvalidInput(rejection.body_text()))?;

    // Only `set` reads the value; other ops ignore whatever was sent.
    let value = match (query.op, query.value.as_deref()) {
        (IntOp::Set, Some(raw)) => Some(raw.trim().parse::<i64>().map_err(|_| {
            AppError::InvalidInput(format!("{raw:?} is not a 64-bit integer"))
        })?),
        _ => None,
    };

    let outcome = state.store.int_op(&key, query.op, &query.session_id, value)?;

    Ok(Json(IntResponse {
        value: outcome.unwrap_or_default(),
        success: outcome.is_some(),
        op: query.op,
    }))
}
