use actix_web::{web, HttpResponse, Responder};
use log::{debug, error, warn};
use ndarray::arr2;

use crate::error::PredictError;
use crate::inference::InferenceError;
use crate::models::{ErrorBody, HealthStatus, PredictionRequest, PredictionResponse};
use crate::state::AppState;
use crate::telemetry;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(["/predict/", "/predict"]).route(web::post().to(predict)))
        .route("/health", web::get().to(health_check))
        .route("/model-info", web::get().to(model_info));
}

/// `POST /predict/`: one row in, one label out.
pub async fn predict(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, PredictError> {
    let request = PredictionRequest::parse(&body).map_err(|e| {
        warn!("Rejected prediction request: {}", e);
        e
    })?;

    let span = telemetry::prediction_span();
    let model = state.model().clone();
    let features = request.to_array();

    let outcome = web::block(move || -> Result<String, InferenceError> {
        let input = arr2(&[features]);
        model
            .predict(input.view())?
            .into_iter()
            .next()
            .ok_or(InferenceError::EmptyOutput)
    })
    .await;

    let label = match outcome {
        Ok(Ok(label)) => label,
        Ok(Err(e)) => {
            error!("Prediction failed for {:?}: {}", features, e);
            telemetry::record_failure(&span, &e);
            return Err(e.into());
        }
        Err(e) => {
            error!("Inference task aborted: {}", e);
            telemetry::record_failure(&span, &e);
            return Err(PredictError::Aborted(e.to_string()));
        }
    };

    telemetry::record_prediction(&span, &label);
    drop(span);

    debug!("Predicted {} for {:?}", label, features);
    Ok(HttpResponse::Ok().json(PredictionResponse {
        predicted_class: label,
    }))
}

pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthStatus {
        status: "ok",
        model: state.model().info().name,
    })
}

pub async fn model_info(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.model().info())
}

pub async fn not_found() -> impl Responder {
    HttpResponse::NotFound().json(ErrorBody {
        detail: "Not Found",
    })
}
