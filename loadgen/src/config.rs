use std::time::Duration;

use clap::Parser;
use rand::Rng;
use thiserror::Error;

/// Drive the iris prediction endpoint with simulated users.
///
/// Each user waits a random interval between `--min-wait` and `--max-wait`
/// seconds, then posts one fixed feature vector to `<host>/predict/`, forever
/// or until `--run-time` elapses or Ctrl-C is pressed.
///
/// ```bash
/// iris-loadgen --host http://127.0.0.1:8080 -u 50 -r 10 -t 60
/// ```
#[derive(Parser, Debug, Clone)]
#[command(name = "iris-loadgen", version)]
pub struct LoadConfig {
    /// Base URL of the prediction service
    #[arg(long)]
    pub host: String,

    /// Number of simulated users
    #[arg(long, short = 'u', default_value_t = 1)]
    pub users: usize,

    /// Users started per second
    #[arg(long, short = 'r', default_value_t = 1.0)]
    pub spawn_rate: f64,

    /// Shortest pause before a request, in seconds
    #[arg(long, default_value_t = 1.0)]
    pub min_wait: f64,

    /// Longest pause before a request, in seconds
    #[arg(long, default_value_t = 2.0)]
    pub max_wait: f64,

    /// Stop after this many seconds; runs until Ctrl-C when omitted
    #[arg(long, short = 't')]
    pub run_time: Option<f64>,

    /// Seed for the pause generator, for reproducible pacing
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seconds between progress reports
    #[arg(long, default_value_t = 5.0)]
    pub report_interval: f64,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 10.0)]
    pub timeout: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("--users must be at least 1")]
    NoUsers,

    #[error("--{flag} must be a positive number of seconds, got {value}")]
    NotPositive { flag: &'static str, value: f64 },

    #[error("--min-wait ({min}) must be a non-negative number not above --max-wait ({max})")]
    WaitRange { min: f64, max: f64 },

    #[error("--{flag} value {value} gives a duration out of range")]
    OutOfRange { flag: &'static str, value: f64 },

    #[error("--host must be an http(s) URL, got {0:?}")]
    Host(String),
}

impl LoadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users == 0 {
            return Err(ConfigError::NoUsers);
        }
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(ConfigError::Host(self.host.clone()));
        }

        let positive = [
            ("spawn-rate", Some(self.spawn_rate)),
            ("report-interval", Some(self.report_interval)),
            ("timeout", Some(self.timeout)),
            ("run-time", self.run_time),
        ];
        for (flag, value) in positive {
            if let Some(value) = value {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::NotPositive { flag, value });
                }
            }
        }

        let (min, max) = (self.min_wait, self.max_wait);
        if !(min.is_finite() && max.is_finite() && 0.0 <= min && min <= max) {
            return Err(ConfigError::WaitRange { min, max });
        }

        // Every duration derived from the flags has to fit in a `Duration`.
        let last_start = (self.users - 1) as f64 / self.spawn_rate;
        if Duration::try_from_secs_f64(last_start).is_err() {
            return Err(ConfigError::OutOfRange {
                flag: "spawn-rate",
                value: self.spawn_rate,
            });
        }
        let durations = [
            ("report-interval", Some(self.report_interval)),
            ("timeout", Some(self.timeout)),
            ("run-time", self.run_time),
            ("max-wait", Some(self.max_wait)),
        ];
        for (flag, value) in durations {
            if let Some(value) = value {
                if Duration::try_from_secs_f64(value).is_err() {
                    return Err(ConfigError::OutOfRange { flag, value });
                }
            }
        }

        Ok(())
    }

    pub fn endpoint(&self) -> String {
        format!("{}/predict/", self.host.trim_end_matches('/'))
    }

    pub fn wait_time(&self) -> WaitTime {
        WaitTime {
            min: Duration::from_secs_f64(self.min_wait),
            max: Duration::from_secs_f64(self.max_wait),
        }
    }

    /// Offset at which user `index` starts.
    pub fn spawn_delay(&self, index: usize) -> Duration {
        Duration::from_secs_f64(index as f64 / self.spawn_rate)
    }
}

/// Uniformly distributed pause between requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitTime {
    pub min: Duration,
    pub max: Duration,
}

impl WaitTime {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        Duration::from_secs_f64(rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64()))
    }
}
