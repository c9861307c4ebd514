use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, Result},
    models::{parse_timeout_ns, MutexLockQuery, SuccessResponse},
};

/// Named binary semaphores, created on first lock and kept for the process lifetime.
///
/// The table map is only touched to look a name up; waiting happens on the
/// semaphore itself, so a blocked caller never holds up other names or the
/// key-value store.
#[derive(Clone, Default)]
pub struct MutexTable {
    mutexes: Arc<DashMap<String, Arc<Semaphore>>>,
}

impl MutexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for `name` to become free and takes it.
    ///
    /// Returns `false` if `timeout` elapses first; in that case nothing is held.
    pub async fn lock(&self, name: &str, timeout: Option<Duration>) -> Result<bool> {
        let semaphore = self
            .mutexes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();

        let acquired = match timeout {
            Some(limit) => match tokio::time::timeout(limit, semaphore.acquire()).await {
                Ok(permit) => Some(permit),
                Err(_) => None,
            },
            None => Some(semaphore.acquire().await),
        };

        match acquired {
            Some(Ok(permit)) => {
                // Held until an explicit unlock, possibly from another request.
                permit.forget();
                debug!("Mutex locked: {}", name);
                Ok(true)
            }
            Some(Err(e)) => Err(AppError::Internal(anyhow::anyhow!(
                "mutex {name} semaphore closed: {e}"
            ))),
            None => {
                debug!("Mutex lock timed out: {} after {:?}", name, timeout);
                Ok(false)
            }
        }
    }

    pub fn unlock(&self, name: &str) -> Result<()> {
        // Exclusive shard access keeps concurrent unlocks from both releasing.
        let semaphore = self.mutexes.get_mut(name).ok_or_else(|| AppError::UnknownMutex {
            name: name.to_string(),
        })?;

        if semaphore.available_permits() > 0 {
            return Err(AppError::MutexNotHeld {
                name: name.to_string(),
            });
        }
        semaphore.add_permits(1);

        debug!("Mutex unlocked: {}", name);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self, name: &str) -> Option<bool> {
        self.mutexes
            .get(name)
            .map(|semaphore| semaphore.available_permits() == 0)
    }

    pub fn len(&self) -> usize {
        self.mutexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutexes.is_empty()
    }
}

// ── Route handlers ──────────────────────────────────────────────────────

pub async fn lock_mutex(
    Path(name): Path<String>,
    Query(query): Query<MutexLockQuery>,
    State(state): State<crate::AppState>,
) -> Result<Json<SuccessResponse>> {
    let timeout = parse_timeout_ns(query.timeout_ns.as_deref())?.or(state.config.mutex_max_wait);

    let success = state.mutexes.lock(&name, timeout).await?;
    if success {
        info!("Mutex acquired: {}", name);
    }
    Ok(Json(SuccessResponse { success }))
}

pub async fn unlock_mutex(
    Path(name): Path<String>,
    State(state): State<crate::AppState>,
) -> Result<Json<SuccessResponse>> {
    if let Err(e) = state.mutexes.unlock(&name) {
        warn!("Mutex unlock rejected: {}", e);
        return Err(e);
    }

    info!("Mutex released: {}", name);
    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_creates_mutex_lazily() {
        let table = MutexTable::new();
        assert!(table.is_empty());
        assert_eq!(table.is_locked("m"), None);

        assert!(table.lock("m", None).await.unwrap());
        assert_eq!(table.len(), 1);
        assert_eq!(table.is_locked("m"), Some(true));
    }

    #[tokio::test]
    async fn test_unlock_unknown_mutex() {
        let table = MutexTable::new();
        assert!(matches!(
            table.unlock("never").unwrap_err(),
            AppError::UnknownMutex { name } if name == "never"
        ));
    }

    #[tokio::test]
    async fn test_unlock_free_mutex() {
        let table = MutexTable::new();
        table.lock("m", None).await.unwrap();
        table.unlock("m").unwrap();

        assert!(matches!(
            table.unlock("m").unwrap_err(),
            AppError::MutexNotHeld { .. }
        ));
        // Still present after release.
        assert_eq!(table.is_locked("m"), Some(false));
    }

    #[tokio::test]
    async fn test_timed_lock_fails_without_claiming() {
        let table = MutexTable::new();
        assert!(table.lock("m", None).await.unwrap());

        let timed_out = table.lock("m", Some(Duration::from_millis(50))).await.unwrap();
        assert!(!timed_out);

        // One unlock frees it completely; the timed-out waiter left nothing behind.
        table.unlock("m").unwrap();
        assert_eq!(table.is_locked("m"), Some(false));
        assert!(table.lock("m", Some(Duration::from_millis(50))).await.unwrap());
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_unlock() {
        let table = MutexTable::new();
        table.lock("m", None).await.unwrap();

        let waiter_table = table.clone();
        let waiter = tokio::spawn(async move { waiter_table.lock("m", None).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        table.unlock("m").unwrap();
        assert!(waiter.await.unwrap());
        assert_eq!(table.is_locked("m"), Some(true));
    }

    #[tokio::test]
    async fn test_names_are_independent() {
        let table = MutexTable::new();
        table.lock("a", None).await.unwrap();

        let other = table.lock("b", Some(Duration::from_millis(50))).await.unwrap();
        assert!(other);
    }

    #[tokio::test]
    async fn test_concurrent_unlocks_release_once() {
        let table = MutexTable::new();
        table.lock("m", None).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                tokio::spawn(async move { table.unlock("m").is_ok() })
            })
            .collect();

        let mut released = 0;
        for handle in handles {
            if handle.await.unwrap() {
                released += 1;
            }
        }
        assert_eq!(released, 1);
        assert_eq!(table.is_locked("m"), Some(false));
    }
}
