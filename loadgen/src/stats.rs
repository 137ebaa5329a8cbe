use std::fmt;
use std::time::Duration;

use hdrhistogram::Histogram;

/// Longest latency tracked at full precision; slower responses are clamped.
const MAX_TRACKED_MICROS: u64 = 3_600_000_000;
const SIGNIFICANT_DIGITS: u8 = 3;

/// Running outcome counts and a fixed-size latency histogram.
///
/// Memory stays constant however long the run lasts; percentiles are exact to
/// three significant digits.
#[derive(Debug, Clone)]
pub struct Stats {
    requests: u64,
    failures: u64,
    latencies: Histogram<u64>,
    min: Duration,
    max: Duration,
    total: Duration,
}

impl Default for Stats {
    fn default() -> Self {
        let latencies = Histogram::new_with_bounds(1, MAX_TRACKED_MICROS, SIGNIFICANT_DIGITS)
            .expect("constant histogram bounds are valid");
        Stats {
            requests: 0,
            failures: 0,
            latencies,
            min: Duration::MAX,
            max: Duration::ZERO,
            total: Duration::ZERO,
        }
    }
}

impl Stats {
    pub fn record_success(&mut self, latency: Duration) {
        self.requests += 1;
        self.record_latency(latency);
    }

    /// Transport errors and non-2xx responses. A failed request still
    /// contributes its latency when a response came back.
    pub fn record_failure(&mut self, latency: Option<Duration>) {
        self.requests += 1;
        self.failures += 1;
        if let Some(latency) = latency {
            self.record_latency(latency);
        }
    }

    fn record_latency(&mut self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latencies.saturating_record(micros);
        self.min = self.min.min(latency);
        self.max = self.max.max(latency);
        self.total = self.total.saturating_add(latency);
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn summary(&self, elapsed: Duration) -> Summary {
        let recorded = self.latencies.len();
        let (min, max, avg) = if recorded == 0 {
            (Duration::ZERO, Duration::ZERO, Duration::ZERO)
        } else {
            let avg_nanos = self.total.as_nanos() / u128::from(recorded);
            let avg = Duration::from_nanos(u64::try_from(avg_nanos).unwrap_or(u64::MAX));
            (self.min, self.max, avg)
        };
        let quantile = |q: f64| {
            if recorded == 0 {
                return Duration::ZERO;
            }
            Duration::from_micros(self.latencies.value_at_quantile(q)).clamp(min, max)
        };

        let secs = elapsed.as_secs_f64();
        Summary {
            requests: self.requests,
            failures: self.failures,
            min,
            max,
            avg,
            p50: quantile(0.50),
            p95: quantile(0.95),
            p99: quantile(0.99),
            requests_per_sec: if secs > 0.0 {
                self.requests as f64 / secs
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub requests: u64,
    pub failures: u64,
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub requests_per_sec: f64,
}

impl Summary {
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests={} failures={} ({:.1}%) rps={:.2}",
            self.requests,
            self.failures,
            self.failure_ratio() * 100.0,
            self.requests_per_sec,
        )?;
        write!(
            f,
            " | latency ms: min={:.1} avg={:.1} p50={:.1} p95={:.1} p99={:.1} max={:.1}",
            ms(self.min),
            ms(self.avg),
            ms(self.p50),
            ms(self.p95),
            ms(self.p99),
            ms(self.max),
        )
    }
}
