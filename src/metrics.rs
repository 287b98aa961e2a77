use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::util::lock_unpoisoned;

/// Point-in-time view of one client's counters.
#[derive(Clone, Debug)]
pub struct ClientMetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub timeouts: u64,
    pub cancellations: u64,
    pub http_status_errors: u64,
    pub transport_errors: u64,
    pub in_flight: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub error_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ClientMetrics {
    inner: Arc<ClientMetricsInner>,
}

#[derive(Debug, Default)]
struct ClientMetricsInner {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    timeouts: AtomicU64,
    cancellations: AtomicU64,
    http_status_errors: AtomicU64,
    transport_errors: AtomicU64,
    in_flight: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    metrics: ClientMetrics,
}

impl ClientMetrics {
    pub(crate) fn record_request_started(&self) {
        self.inner.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter_in_flight(&self) -> InFlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    /// Records the raw status of every transport response, validated or not.
    pub(crate) fn record_response_status(&self, status: u16) {
        let mut status_counts = lock_unpoisoned(&self.inner.status_counts);
        *status_counts.entry(status).or_insert(0) += 1;
    }

    pub(crate) fn record_success(&self) {
        self.inner
            .requests_succeeded
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, error: &Error) {
        self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
        match error {
            Error::TimedOut { .. } => {
                self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Error::Cancelled { .. } => {
                self.inner.cancellations.fetch_add(1, Ordering::Relaxed);
            }
            Error::HttpStatus { .. } => {
                self.inner.http_status_errors.fetch_add(1, Ordering::Relaxed);
            }
            Error::Transport { .. } => {
                self.inner.transport_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        let mut error_counts = lock_unpoisoned(&self.inner.error_counts);
        *error_counts
            .entry(error.code().as_str().to_owned())
            .or_insert(0) += 1;
    }

    pub(crate) fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            requests_started: self.inner.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.inner.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            cancellations: self.inner.cancellations.load(Ordering::Relaxed),
            http_status_errors: self.inner.http_status_errors.load(Ordering::Relaxed),
            transport_errors: self.inner.transport_errors.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            status_counts: lock_unpoisoned(&self.inner.status_counts).clone(),
            error_counts: lock_unpoisoned(&self.inner.error_counts).clone(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
