//! Load generator for the iris prediction service.
//!
//! Simulated users each sleep a random interval and then post a fixed
//! feature vector to `/predict/`; [`runner::run`] drives them and returns the
//! aggregated latency statistics.

pub mod config;
pub mod runner;
pub mod stats;

pub use config::LoadConfig;
pub use stats::Summary;
