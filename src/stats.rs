//! Request and stream outcome counters.
//!
//! Lock-free atomics for the hot counters; the per-model and per-status
//! tables sit behind `RwLock`s since they are touched once per request.

use crate::scheduler::StreamOutcome;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Counters are independent; no cross-counter ordering is needed
const ORDERING: Ordering = Ordering::Relaxed;

/// Rolling window for the requests-per-second figure
const RPS_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct Stats {
    start_time: Instant,

    pub total_requests: AtomicU64,
    /// Requests accepted but not yet finished, failed or cancelled
    pub active_requests: AtomicU64,
    pub streaming_requests: AtomicU64,
    pub non_streaming_requests: AtomicU64,

    /// Responses that emitted their whole plan
    pub completed_responses: AtomicU64,
    /// Responses cut short by a time budget
    pub truncated_responses: AtomicU64,
    /// Streams dropped by the client before the terminal chunk
    pub cancelled_streams: AtomicU64,

    pub prompt_tokens: AtomicU64,
    pub completion_tokens: AtomicU64,

    pub total_errors: AtomicU64,
    errors_by_status: RwLock<BTreeMap<u16, u64>>,

    model_requests: RwLock<BTreeMap<String, u64>>,

    // Microseconds
    total_latency_us: AtomicU64,
    finished_requests: AtomicU64,
    min_latency_us: AtomicU64,
    max_latency_us: AtomicU64,

    request_times: RwLock<Vec<Instant>>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            active_requests: AtomicU64::new(0),
            streaming_requests: AtomicU64::new(0),
            non_streaming_requests: AtomicU64::new(0),
            completed_responses: AtomicU64::new(0),
            truncated_responses: AtomicU64::new(0),
            cancelled_streams: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            errors_by_status: RwLock::new(BTreeMap::new()),
            model_requests: RwLock::new(BTreeMap::new()),
            total_latency_us: AtomicU64::new(0),
            finished_requests: AtomicU64::new(0),
            min_latency_us: AtomicU64::new(u64::MAX),
            max_latency_us: AtomicU64::new(0),
            request_times: RwLock::new(Vec::new()),
        }
    }

    /// A chat request was received and parsed
    pub fn record_request_start(&self, model: &str, is_streaming: bool) {
        self.total_requests.fetch_add(1, ORDERING);
        self.active_requests.fetch_add(1, ORDERING);

        if is_streaming {
            self.streaming_requests.fetch_add(1, ORDERING);
        } else {
            self.non_streaming_requests.fetch_add(1, ORDERING);
        }

        if let Ok(mut map) = self.model_requests.write() {
            *map.entry(model.to_string()).or_insert(0) += 1;
        }

        if let Ok(mut times) = self.request_times.write() {
            let now = Instant::now();
            times.push(now);
            times.retain(|t| now.duration_since(*t) < RPS_WINDOW);
        }
    }

    /// A response reached its terminal record
    pub fn record_response_end(
        &self,
        latency: Duration,
        prompt_tokens: usize,
        completion_tokens: usize,
        outcome: StreamOutcome,
    ) {
        self.finish(latency, prompt_tokens, completion_tokens);
        match outcome {
            StreamOutcome::Completed => self.completed_responses.fetch_add(1, ORDERING),
            StreamOutcome::Truncated => self.truncated_responses.fetch_add(1, ORDERING),
        };
    }

    /// The client went away mid-stream; `emitted` tokens were sent
    pub fn record_cancelled(&self, latency: Duration, prompt_tokens: usize, emitted: usize) {
        self.finish(latency, prompt_tokens, emitted);
        self.cancelled_streams.fetch_add(1, ORDERING);
    }

    /// A started request failed before producing a response
    pub fn record_request_failed(&self, status_code: u16) {
        self.active_requests.fetch_sub(1, ORDERING);
        self.record_error(status_code);
    }

    /// An error response, whether or not the request was started
    pub fn record_error(&self, status_code: u16) {
        self.total_errors.fetch_add(1, ORDERING);
        if let Ok(mut map) = self.errors_by_status.write() {
            *map.entry(status_code).or_insert(0) += 1;
        }
    }

    fn finish(&self, latency: Duration, prompt_tokens: usize, completion_tokens: usize) {
        self.active_requests.fetch_sub(1, ORDERING);
        self.finished_requests.fetch_add(1, ORDERING);
        self.prompt_tokens.fetch_add(prompt_tokens as u64, ORDERING);
        self.completion_tokens
            .fetch_add(completion_tokens as u64, ORDERING);

        let latency_us = latency.as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, ORDERING);
        self.min_latency_us.fetch_min(latency_us, ORDERING);
        self.max_latency_us.fetch_max(latency_us, ORDERING);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Requests per second over the last minute
    pub fn requests_per_second(&self) -> f64 {
        let Ok(times) = self.request_times.read() else {
            return 0.0;
        };
        let now = Instant::now();
        let recent: Vec<&Instant> = times
            .iter()
            .filter(|t| now.duration_since(**t) < RPS_WINDOW)
            .collect();
        let Some(oldest) = recent.iter().min() else {
            return 0.0;
        };
        let window = now.duration_since(**oldest).as_secs_f64();
        if window > 0.0 {
            recent.len() as f64 / window
        } else {
            0.0
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let finished = self.finished_requests.load(ORDERING);
        if finished == 0 {
            return 0.0;
        }
        let total_us = self.total_latency_us.load(ORDERING);
        (total_us as f64 / finished as f64) / 1000.0
    }

    pub fn min_latency_ms(&self) -> Option<f64> {
        match self.min_latency_us.load(ORDERING) {
            u64::MAX => None,
            min => Some(min as f64 / 1000.0),
        }
    }

    pub fn max_latency_ms(&self) -> Option<f64> {
        match self.max_latency_us.load(ORDERING) {
            0 => None,
            max => Some(max as f64 / 1000.0),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.load(ORDERING) + self.completion_tokens.load(ORDERING)
    }

    pub fn model_requests(&self) -> BTreeMap<String, u64> {
        self.model_requests
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn errors_by_status(&self) -> BTreeMap<u16, u64> {
        self.errors_by_status
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Get a snapshot of all stats for serialization
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            total_requests: self.total_requests.load(ORDERING),
            active_requests: self.active_requests.load(ORDERING),
            streaming_requests: self.streaming_requests.load(ORDERING),
            non_streaming_requests: self.non_streaming_requests.load(ORDERING),
            completed_responses: self.completed_responses.load(ORDERING),
            truncated_responses: self.truncated_responses.load(ORDERING),
            cancelled_streams: self.cancelled_streams.load(ORDERING),
            prompt_tokens: self.prompt_tokens.load(ORDERING),
            completion_tokens: self.completion_tokens.load(ORDERING),
            total_tokens: self.total_tokens(),
            total_errors: self.total_errors.load(ORDERING),
            errors_by_status: self.errors_by_status(),
            requests_per_second: self.requests_per_second(),
            avg_latency_ms: self.avg_latency_ms(),
            min_latency_ms: self.min_latency_ms(),
            max_latency_ms: self.max_latency_ms(),
            model_requests: self.model_requests(),
        }
    }
}

/// A serializable snapshot of statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub active_requests: u64,
    pub streaming_requests: u64,
    pub non_streaming_requests: u64,
    pub completed_responses: u64,
    pub truncated_responses: u64,
    pub cancelled_streams: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub total_errors: u64,
    pub errors_by_status: BTreeMap<u16, u64>,
    pub requests_per_second: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub model_requests: BTreeMap<String, u64>,
}

/// Shared stats handle for use across threads
pub type SharedStats = Arc<Stats>;

pub fn new_shared_stats() -> SharedStats {
    Arc::new(Stats::new())
}
