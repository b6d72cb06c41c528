//! Lightweight metrics collection for observability
//!
//! Counters are plain atomics; the per-strategy table sits behind a mutex
//! taken only on the recording path. Export is hand-rolled Prometheus text
//! format, so no metrics client library is needed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use limitcrab::Collector;

#[derive(Default, Clone, Copy)]
struct StrategyStats {
    allowed: u64,
    denied: u64,
    checks: u64,
    total_check_micros: u64,
}

/// Core metrics collected by the server.
///
/// Implements the engine library's [`Collector`], so installing it on the
/// strategy manager instruments every admission check.
pub struct ServerMetrics {
    /// Server start time
    start_time: Instant,

    /// HTTP requests served, across all endpoints
    pub http_requests: AtomicU64,

    /// Admission checks that failed with an engine error
    pub request_errors: AtomicU64,

    /// Per-strategy decision and latency counters
    strategies: Mutex<HashMap<String, StrategyStats>>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            http_requests: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
            strategies: Mutex::new(HashMap::new()),
        }
    }

    /// Record one served HTTP request.
    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an admission check that failed with an engine error.
    pub fn record_error(&self) {
        self.request_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Escape a string for use as a Prometheus label value
    fn escape_prometheus_label(s: &str) -> String {
        let mut result = String::with_capacity(s.len() * 2);
        for ch in s.chars() {
            match ch {
                '"' => result.push_str("\\\""),
                '\\' => result.push_str("\\\\"),
                '\n' => result.push_str("\\n"),
                c => result.push(c),
            }
        }
        result
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(1024);

        output.push_str("# HELP limitcrab_uptime_seconds Time since server start in seconds\n");
        output.push_str("# TYPE limitcrab_uptime_seconds gauge\n");
        output.push_str(&format!(
            "limitcrab_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str("# HELP limitcrab_http_requests_total Total HTTP requests served\n");
        output.push_str("# TYPE limitcrab_http_requests_total counter\n");
        output.push_str(&format!(
            "limitcrab_http_requests_total {}\n\n",
            self.http_requests.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP limitcrab_request_errors_total Admission checks that failed with an error\n",
        );
        output.push_str("# TYPE limitcrab_request_errors_total counter\n");
        output.push_str(&format!(
            "limitcrab_request_errors_total {}\n\n",
            self.request_errors.load(Ordering::Relaxed)
        ));

        let strategies = self
            .strategies
            .lock()
            .map(|table| {
                let mut entries: Vec<_> =
                    table.iter().map(|(name, stats)| (name.clone(), *stats)).collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries
            })
            .unwrap_or_default();

        output.push_str(
            "# HELP limitcrab_requests_total Admission decisions by strategy and outcome\n",
        );
        output.push_str("# TYPE limitcrab_requests_total counter\n");
        for (name, stats) in &strategies {
            let label = Self::escape_prometheus_label(name);
            output.push_str(&format!(
                "limitcrab_requests_total{{strategy=\"{label}\",decision=\"allowed\"}} {}\n",
                stats.allowed
            ));
            output.push_str(&format!(
                "limitcrab_requests_total{{strategy=\"{label}\",decision=\"denied\"}} {}\n",
                stats.denied
            ));
        }
        output.push('\n');

        output.push_str(
            "# HELP limitcrab_check_duration_seconds Time spent in admission checks\n",
        );
        output.push_str("# TYPE limitcrab_check_duration_seconds summary\n");
        for (name, stats) in &strategies {
            let label = Self::escape_prometheus_label(name);
            output.push_str(&format!(
                "limitcrab_check_duration_seconds_sum{{strategy=\"{label}\"}} {}\n",
                stats.total_check_micros as f64 / 1e6
            ));
            output.push_str(&format!(
                "limitcrab_check_duration_seconds_count{{strategy=\"{label}\"}} {}\n",
                stats.checks
            ));
        }

        output
    }
}

impl Collector for ServerMetrics {
    fn record_decision(&self, strategy: &str, allowed: bool) {
        if let Ok(mut table) = self.strategies.lock() {
            let stats = table.entry(strategy.to_string()).or_default();
            if allowed {
                stats.allowed += 1;
            } else {
                stats.denied += 1;
            }
        }
    }

    fn record_duration(&self, strategy: &str, duration: Duration) {
        if let Ok(mut table) = self.strategies.lock() {
            let stats = table.entry(strategy.to_string()).or_default();
            stats.checks += 1;
            stats.total_check_micros += duration.as_micros() as u64;
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
