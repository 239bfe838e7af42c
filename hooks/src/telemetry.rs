//! Process-wide deployment metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters shared by the HTTP front door and the deployment queue.
///
/// Never reset while the process lives.
#[derive(Debug)]
pub struct Metrics {
    total_requests: AtomicU64,
    total_deployments: AtomicU64,
    successful_deployments: AtomicU64,
    failed_deployments: AtomicU64,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_deployments: AtomicU64::new(0),
            successful_deployments: AtomicU64::new(0),
            failed_deployments: AtomicU64::new(0),
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_deployment_started(&self) {
        self.total_deployments.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_deployment_succeeded(&self) {
        self.successful_deployments.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_deployment_failed(&self) {
        self.failed_deployments.fetch_add(1, Ordering::SeqCst);
    }

    /// Seconds since the service started
    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_deployments = self.total_deployments.load(Ordering::SeqCst);
        let successful_deployments = self.successful_deployments.load(Ordering::SeqCst);

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::SeqCst),
            total_deployments,
            successful_deployments,
            failed_deployments: self.failed_deployments.load(Ordering::SeqCst),
            success_rate: success_rate(successful_deployments, total_deployments),
            start_time: self.start_time,
            uptime: self.uptime_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view served by `GET /metrics`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_deployments: u64,
    pub successful_deployments: u64,
    pub failed_deployments: u64,
    pub success_rate: String,
    pub start_time: DateTime<Utc>,
    pub uptime: f64,
}

/// `successful / total * 100` with two decimals, `"N/A"` before any deployment.
pub fn success_rate(successful: u64, total: u64) -> String {
    if total == 0 {
        return "N/A".to_string();
    }
    format!("{:.2}", successful as f64 / total as f64 * 100.0)
}
