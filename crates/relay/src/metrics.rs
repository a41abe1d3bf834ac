use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
};

pub struct RelayMetrics {
    connections_total: AtomicU64,
    relayed_envelopes_total: AtomicU64,
    dropped_envelopes_total: Mutex<HashMap<String, u64>>,
    broadcast_send_failures_total: AtomicU64,
    active_sessions: AtomicI64,
}

static GLOBAL_METRICS: OnceLock<Arc<RelayMetrics>> = OnceLock::new();

impl Default for RelayMetrics {
    fn default() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            relayed_envelopes_total: AtomicU64::new(0),
            dropped_envelopes_total: Mutex::new(HashMap::new()),
            broadcast_send_failures_total: AtomicU64::new(0),
            active_sessions: AtomicI64::new(0),
        }
    }
}

pub fn set_global_metrics(metrics: Arc<RelayMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

fn global_metrics() -> Option<&'static Arc<RelayMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn record_connection_opened() {
    if let Some(metrics) = global_metrics() {
        metrics.record_connection_opened();
    }
}

pub fn record_connection_closed() {
    if let Some(metrics) = global_metrics() {
        metrics.record_connection_closed();
    }
}

pub fn record_relayed_envelope() {
    if let Some(metrics) = global_metrics() {
        metrics.record_relayed_envelope();
    }
}

pub fn record_dropped_envelope(reason: &str) {
    if let Some(metrics) = global_metrics() {
        metrics.record_dropped_envelope(reason);
    }
}

pub fn record_broadcast_send_failure() {
    if let Some(metrics) = global_metrics() {
        metrics.record_broadcast_send_failure();
    }
}

impl RelayMetrics {
    pub fn record_connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_relayed_envelope(&self) {
        self.relayed_envelopes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_envelope(&self, reason: &str) {
        let mut dropped = match self.dropped_envelopes_total.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *dropped.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn record_broadcast_send_failure(&self) {
        self.broadcast_send_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections_total(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    pub fn relayed_envelopes_total(&self) -> u64 {
        self.relayed_envelopes_total.load(Ordering::Relaxed)
    }

    pub fn dropped_envelopes_total(&self, reason: &str) -> u64 {
        let dropped = match self.dropped_envelopes_total.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        dropped.get(reason).copied().unwrap_or(0)
    }

    pub fn broadcast_send_failures_total(&self) -> u64 {
        self.broadcast_send_failures_total.load(Ordering::Relaxed)
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.load(Ordering::Relaxed)
    }
}
