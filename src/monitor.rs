//! Request-level alerting: rolling 5xx rate and slow-handler warnings.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

// ---------- Error rate ----------

/// Share of 5xx responses over the last `window` responses, shared by all
/// requests.
pub struct ErrorRateMonitor {
    threshold: f64,
    window: usize,
    outcomes: Mutex<VecDeque<bool>>,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    alerts: AtomicU64,
}

impl ErrorRateMonitor {
    pub fn new(threshold: f64, window: usize) -> Self {
        let window = window.max(1);
        Self {
            threshold,
            window,
            outcomes: Mutex::new(VecDeque::with_capacity(window)),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
        }
    }

    /// Record one response. Returns the current rate when it is above the threshold.
    pub fn record(&self, is_error: bool) -> Option<f64> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }

        let rate = {
            let mut outcomes = self.outcomes.lock();
            if outcomes.len() == self.window {
                outcomes.pop_front();
            }
            outcomes.push_back(is_error);
            let errors = outcomes.iter().filter(|e| **e).count();
            errors as f64 / outcomes.len() as f64
        };

        if rate > self.threshold {
            self.alerts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "High error rate: {:.2}%, threshold exceeded: {:.2}%",
                rate * 100.0,
                self.threshold * 100.0
            );
            Some(rate)
        } else {
            None
        }
    }

    pub fn current_rate(&self) -> f64 {
        let outcomes = self.outcomes.lock();
        if outcomes.is_empty() {
            return 0.0;
        }
        outcomes.iter().filter(|e| **e).count() as f64 / outcomes.len() as f64
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub fn alert_count(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }
}

// ---------- Response time ----------

pub struct ResponseTimer {
    threshold: Duration,
    alerts: AtomicU64,
}

impl ResponseTimer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            alerts: AtomicU64::new(0),
        }
    }

    /// Warn when `elapsed` is over the threshold; returns whether it was.
    pub fn check(&self, route: &str, elapsed: Duration) -> bool {
        if elapsed <= self.threshold {
            return false;
        }
        self.alerts.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            route,
            "High response time: {:.2} seconds, the {:.2} second threshold is exceeded",
            elapsed.as_secs_f64(),
            self.threshold.as_secs_f64()
        );
        true
    }

    pub fn alert_count(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }
}

// ---------- Middleware ----------

pub async fn track_errors(
    State(monitor): State<Arc<ErrorRateMonitor>>,
    req: Request,
    next: Next,
) -> Response {
    let resp = next.run(req).await;
    monitor.record(resp.status().is_server_error());
    resp
}

pub async fn track_response_time(
    State(timer): State<Arc<ResponseTimer>>,
    req: Request,
    next: Next,
) -> Response {
    let route = req.uri().path().to_owned();
    let start = Instant::now();
    let resp = next.run(req).await;
    timer.check(&route, start.elapsed());
    resp
}
