pub mod server;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics output is not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    // Chain index
    tip_height: IntGauge,
    root_height: IntGauge,
    // Sync
    sync_state: IntGauge,
    peer_sessions: IntCounterVec,
    headers_accepted: IntCounterVec,
    headers_rejected: IntCounterVec,
    batch_processing_time: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let tip_height = IntGauge::with_opts(Opts::new(
            "header_node_tip_height",
            "Height of the chain index tip",
        ))?;
        registry.register(Box::new(tip_height.clone()))?;

        let root_height = IntGauge::with_opts(Opts::new(
            "header_node_root_height",
            "Height of the lowest retained header",
        ))?;
        registry.register(Box::new(root_height.clone()))?;

        let sync_state = IntGauge::with_opts(Opts::new(
            "header_node_sync_state",
            "Sync state (0 closed, 1 opening, 2 connecting, 3 syncing, 4 idle)",
        ))?;
        registry.register(Box::new(sync_state.clone()))?;

        let peer_sessions = IntCounterVec::new(
            Opts::new(
                "header_node_peer_session_events_total",
                "Total number of peer session events",
            ),
            &["event"],
        )?;
        registry.register(Box::new(peer_sessions.clone()))?;

        let headers_accepted = IntCounterVec::new(
            Opts::new(
                "header_node_headers_accepted_total",
                "Total number of headers appended to the index",
            ),
            &[],
        )?;
        registry.register(Box::new(headers_accepted.clone()))?;

        let headers_rejected = IntCounterVec::new(
            Opts::new(
                "header_node_headers_rejected_total",
                "Total number of header batches rejected",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(headers_rejected.clone()))?;

        let batch_processing_time = HistogramVec::new(
            HistogramOpts::new(
                "header_node_batch_processing_time_seconds",
                "Time taken to validate and persist a header batch",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0]),
            &[],
        )?;
        registry.register(Box::new(batch_processing_time.clone()))?;

        Ok(Self {
            registry,
            tip_height,
            root_height,
            sync_state,
            peer_sessions,
            headers_accepted,
            headers_rejected,
            batch_processing_time,
        })
    }

    pub fn gather(&self) -> Result<String, MetricsError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn set_tip_height(&self, v: u64) {
        self.tip_height.set(v as i64);
    }

    pub fn set_root_height(&self, v: u64) {
        self.root_height.set(v as i64);
    }

    pub fn set_sync_state(&self, v: i64) {
        self.sync_state.set(v);
    }

    pub fn inc_peer_session(&self, event: &str) {
        self.peer_sessions.with_label_values(&[event]).inc();
    }

    pub fn inc_headers_accepted(&self, count: u64) {
        self.headers_accepted.with_label_values::<&str>(&[]).inc_by(count);
    }

    pub fn inc_headers_rejected(&self, reason: &str) {
        self.headers_rejected.with_label_values(&[reason]).inc();
    }

    pub fn observe_batch_processing_time(&self, duration: f64) {
        self.batch_processing_time.with_label_values::<&str>(&[]).observe(duration);
    }
}

pub type SharedMetrics = Arc<Metrics>;
