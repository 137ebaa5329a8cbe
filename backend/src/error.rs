use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::inference::{ArtifactError, InferenceError};
use crate::models::{ErrorBody, FieldError, ValidationErrors};

/// Conditions that keep the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid server configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("unable to load model artifact: {0}")]
    Model(#[from] ArtifactError),
}

/// Failures of a single prediction request.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("inference task did not complete: {0}")]
    Aborted(String),
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictError::Inference(_) | PredictError::Aborted(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            PredictError::Validation(e) => {
                HttpResponse::build(self.status_code()).json(ErrorBody::<&[FieldError]> {
                    detail: &e.errors,
                })
            }
            _ => HttpResponse::build(self.status_code()).json(ErrorBody {
                detail: "Internal Server Error",
            }),
        }
    }
}
