use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::metrics::{self, Metrics};
use crate::mutex::{self, MutexTable};
use crate::store::KvStore;
use crate::{counters, kv, sessions};

#[derive(Clone)]
pub struct AppState {
    pub store: KvStore,
    pub mutexes: MutexTable,
    pub config: Config,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let metrics = Metrics::new();
        Self {
            store: KvStore::new(metrics.clone()),
            mutexes: MutexTable::new(),
            config,
            metrics,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(kv::status))
        // Session routes
        .route("/session/renew/:session_id/:duration", post(sessions::renew_session))
        .route("/session/destroy/:session_id", post(sessions::destroy_session))
        // Key-value routes
        .route("/kv/keys", get(kv::list_keys))
        .route("/kv/acquire/:key/:duration", post(kv::acquire))
        .route("/kv/release/:key/:session_id", post(kv::release))
        .route("/kv/set/:key", post(kv::set))
        .route("/kv/get/:key", get(kv::get))
        .route("/kv/getm", get(kv::get_many))
        .route("/kv/setm", post(kv::set_many))
        // Mutex routes
        .route("/mutex/lock/:key", post(mutex::lock_mutex))
        .route("/mutex/unlock/:key", post(mutex::unlock_mutex))
        // Counter routes
        .route("/int/:key", post(counters::int_op))
        .route("/metrics", get(metrics::metrics_snapshot))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
