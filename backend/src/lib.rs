//! Iris classifier prediction service.
//!
//! The binary in `main.rs` wires these pieces together; tests build the same
//! application with [`routes::configure`] and a substitute
//! [`inference::Classifier`].

pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use error::{PredictError, StartupError};
pub use state::AppState;
