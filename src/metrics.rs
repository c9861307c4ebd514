use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Json,
};
use serde_json::{json, Value};

/// Upper bounds (ms) of the latency histogram buckets; the last one catches everything else.
const BUCKET_BOUNDS_MS: [f64; 8] = [0.5, 1.0, 2.0, 5.0, 10.0, 50.0, 100.0, f64::INFINITY];

pub struct EndpointMetrics {
    pub count: AtomicU64,
    pub total_duration_us: AtomicU64,
    pub errors: AtomicU64,
    pub min_ms: AtomicU32,
    pub max_ms: AtomicU32,
    buckets: [AtomicU64; 8],
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_duration_us: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            min_ms: AtomicU32::new(u32::MAX),
            max_ms: AtomicU32::new(0),
            buckets: Default::default(),
        }
    }
}

impl EndpointMetrics {
    pub fn record(&self, duration_ms: f64, is_error: bool) {
        let duration_ms_u32 = duration_ms as u32;

        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_us
            .fetch_add((duration_ms * 1000.0) as u64, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.min_ms.fetch_min(duration_ms_u32, Ordering::Relaxed);
        self.max_ms.fetch_max(duration_ms_u32, Ordering::Relaxed);

        let bucket = BUCKET_BOUNDS_MS
            .iter()
            .position(|bound| duration_ms <= *bound)
            .unwrap_or(BUCKET_BOUNDS_MS.len() - 1);
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_us = self.total_duration_us.load(Ordering::Relaxed);
        let min_ms = self.min_ms.load(Ordering::Relaxed);
        let bucket_counts: Vec<u64> = self
            .buckets
            .iter()
            .map(|bucket| bucket.load(Ordering::Relaxed))
            .collect();

        let (p50_ms, p95_ms, p99_ms) = calculate_percentiles(&bucket_counts, count);

        EndpointSnapshot {
            count,
            avg_ms: if count > 0 { total_us as f64 / 1000.0 / count as f64 } else { 0.0 },
            p50_ms,
            p95_ms,
            p99_ms,
            errors: self.errors.load(Ordering::Relaxed),
            min_ms: if min_ms == u32::MAX { 0 } else { min_ms },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct EndpointSnapshot {
    pub count: u64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub errors: u64,
    pub min_ms: u32,
    pub max_ms: u32,
}

pub struct Metrics {
    pub start_time: Instant,
    pub kv: EndpointMetrics,
    pub session: EndpointMetrics,
    pub mutex: EndpointMetrics,
    pub int: EndpointMetrics,
    pub total_requests: AtomicU64,
    pub acquires: AtomicU64,
    pub releases: AtomicU64,
    pub expirations: AtomicU64,
    pub destroys: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            kv: EndpointMetrics::default(),
            session: EndpointMetrics::default(),
            mutex: EndpointMetrics::default(),
            int: EndpointMetrics::default(),
            total_requests: AtomicU64::new(0),
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            destroys: AtomicU64::new(0),
        }
    }
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, endpoint: &str, duration_ms: f64, is_error: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let endpoint_metrics = match endpoint {
            "kv" => &self.kv,
            "session" => &self.session,
            "mutex" => &self.mutex,
            "int" => &self.int,
            _ => return,
        };
        endpoint_metrics.record(duration_ms, is_error);
    }

    pub fn record_store_operation(&self, operation: &str) {
        let counter = match operation {
            "acquire" => &self.acquires,
            "release" => &self.releases,
            "expiration" => &self.expirations,
            "destroy" => &self.destroys,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Value {
        let uptime = self.start_time.elapsed().as_secs();
        let total_requests = self.total_requests.load(Ordering::Relaxed);

        json!({
            "uptime_seconds": uptime,
            "total_requests": total_requests,
            "requests_per_second": if uptime > 0 { total_requests as f64 / uptime as f64 } else { 0.0 },
            "endpoints": {
                "kv": endpoint_to_json(&self.kv.snapshot()),
                "session": endpoint_to_json(&self.session.snapshot()),
                "mutex": endpoint_to_json(&self.mutex.snapshot()),
                "int": endpoint_to_json(&self.int.snapshot()),
            },
            "store": {
                "total_acquires": self.acquires.load(Ordering::Relaxed),
                "total_releases": self.releases.load(Ordering::Relaxed),
                "total_expirations": self.expirations.load(Ordering::Relaxed),
                "total_destroys": self.destroys.load(Ordering::Relaxed),
            },
        })
    }
}

fn endpoint_to_json(snapshot: &EndpointSnapshot) -> Value {
    json!({
        "count": snapshot.count,
        "avg_ms": format!("{:.1}", snapshot.avg_ms),
        "p50_ms": format!("{:.1}", snapshot.p50_ms),
        "p95_ms": format!("{:.1}", snapshot.p95_ms),
        "p99_ms": format!("{:.1}", snapshot.p99_ms),
        "errors": snapshot.errors,
        "min_ms": snapshot.min_ms,
        "max_ms": snapshot.max_ms
    })
}

/// Approximate percentiles: each one reports the upper bound of the bucket it falls in.
fn calculate_percentiles(bucket_counts: &[u64], total: u64) -> (f64, f64, f64) {
    if total == 0 {
        return (0.0, 0.0, 0.0);
    }

    let targets = [0.50, 0.95, 0.99].map(|q| (total as f64 * q).ceil() as u64);
    let mut found = [None; 3];
    let mut cumulative = 0u64;

    for (count, bound) in bucket_counts.iter().zip(BUCKET_BOUNDS_MS) {
        cumulative += *count;
        for (slot, target) in found.iter_mut().zip(targets) {
            if slot.is_none() && cumulative >= target {
                *slot = Some(bound);
            }
        }
    }

    let [p50, p95, p99] = found.map(|p| p.unwrap_or(0.0));
    (p50, p95, p99)
}

pub fn endpoint_from_path(path: &str) -> Option<&'static str> {
    if path.starts_with("/kv/") {
        Some("kv")
    } else if path.starts_with("/session/") {
        Some("session")
    } else if path.starts_with("/mutex/") {
        Some("mutex")
    } else if path.starts_with("/int/") {
        Some("int")
    } else {
        None
    }
}

/// Middleware timing every request against its endpoint group.
pub async fn track_requests(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = endpoint_from_path(request.uri().path());
    let started = Instant::now();

    let response = next.run(request).await;

    if let Some(endpoint) = endpoint {
        let status = response.status();
        let is_error = status.is_client_error() || status.is_server_error();
        metrics.record_request(endpoint, started.elapsed().as_secs_f64() * 1000.0, is_error);
    }
    response
}

pub async fn metrics_snapshot(State(state): State<crate::AppState>) -> Json<Value> {
    let mut snapshot = state.metrics.snapshot();
    snapshot["active_sessions"] = json!(state.store.session_count());
    snapshot["keys"] = json!(state.store.key_count());
    snapshot["mutexes"] = json!(state.mutexes.len());
    Json(snapshot)
}
