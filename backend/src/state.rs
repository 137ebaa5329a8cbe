use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::StartupError;
use crate::inference::{Classifier, ModelInference};

/// Everything a request handler needs, built once before the server starts.
#[derive(Clone)]
pub struct AppState {
    model: Arc<dyn Classifier>,
}

impl AppState {
    pub fn new(model: Arc<dyn Classifier>) -> Self {
        AppState { model }
    }

    /// Loads the configured model artifact. Any failure here is fatal.
    pub fn load(config: &ServerConfig) -> Result<Self, StartupError> {
        let model = ModelInference::load(&config.model_path)?;
        Ok(Self::new(Arc::new(model)))
    }

    pub fn model(&self) -> &Arc<dyn Classifier> {
        &self.model
    }
}
