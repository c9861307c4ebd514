use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireResponse {
    /// Empty when the key was already locked.
    pub session_id: String,
    pub success: bool,
}

/// Body shared by every endpoint that only reports whether it took effect.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub success: bool,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueSuccess {
    #[serde(flatten)]
    pub entry: KeyValue,
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetManyRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetManyResponse {
    pub entries: Vec<KeyValueSuccess>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetManyRequest {
    pub entries: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
pub struct KeysQuery {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct AcquireQuery {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQuery {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MutexLockQuery {
    #[serde(rename = "timeoutNs", alias = "timeout", default)]
    pub timeout_ns: Option<String>,
}

/// Parses a lease duration given as integer nanoseconds.
///
/// Zero and negative values are accepted and yield an already-elapsed lease.
pub fn parse_duration_ns(raw: &str) -> Result<Duration> {
    let nanos: i64 = raw.trim().parse().map_err(|_| AppError::InvalidDuration {
        reason: format!("{raw:?} is not an integer number of nanoseconds"),
    })?;
    Ok(Duration::from_nanos(nanos.max(0) as u64))
}

/// Parses an optional mutex wait timeout given as integer nanoseconds.
///
/// An absent or empty value means "wait forever"; anything present must be
/// strictly positive.
pub fn parse_timeout_ns(raw: Option<&str>) -> Result<Option<Duration>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    let nanos: i64 = raw.parse().map_err(|_| AppError::InvalidTimeout {
        reason: format!("{raw:?} is not an integer number of nanoseconds"),
    })?;
    if nanos <= 0 {
        return Err(AppError::InvalidTimeout {
            reason: "timeout must be greater than 0".to_string(),
        });
    }
    Ok(Some(Duration::from_nanos(nanos as u64)))
}
