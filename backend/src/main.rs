use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use log::{error, info, warn};

use iris_backend::config::ServerConfig;
use iris_backend::{routes, telemetry, AppState, StartupError};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    info!("🚀 Starting iris classifier API");

    let config = ServerConfig::from_env().map_err(StartupError::from)?;

    // The model must be in memory before the listener is bound.
    let state = match AppState::load(&config) {
        Ok(state) => {
            let model = state.model().info();
            info!(
                "✅ Model {} v{} ({}) loaded from {}, classes: {:?}",
                model.name,
                model.version,
                model.kind,
                config.model_path.display(),
                model.classes
            );
            state
        }
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    let telemetry = telemetry::init(&config.telemetry).context("unable to initialize tracing")?;
    match &config.telemetry.otlp_endpoint {
        Some(endpoint) => info!(
            "📡 Exporting spans to {} as {}",
            endpoint, config.telemetry.service_name
        ),
        None => warn!("OTEL_EXPORTER_OTLP_ENDPOINT not set, spans are not exported"),
    }

    let state_data = web::Data::new(state);
    let payload_limit = config.payload_limit;
    let bind_address = config.bind_address();

    info!("🌐 Listening on http://{}", bind_address);
    info!("👷 Workers: {}", config.workers);
    info!("🔧 Endpoints:");
    info!("   POST /predict/    - Predict iris species");
    info!("   GET  /health      - Health check");
    info!("   GET  /model-info  - Loaded model metadata");

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .app_data(state_data.clone())
            .app_data(web::PayloadConfig::new(payload_limit))
            .configure(routes::configure)
            .default_service(web::to(routes::not_found))
    })
    .workers(config.workers);

    if let Some(max) = config.max_connections {
        info!("🚦 Max connections per worker: {}", max);
        server = server.max_connections(max);
    }

    let served = match server.bind(&bind_address) {
        Ok(server) => server.run().await.context("server terminated with an error"),
        Err(e) => Err(e).with_context(|| format!("unable to bind {}", bind_address)),
    };

    // The exporter's connection is driven by this runtime, so the final flush
    // has to block on another thread.
    if let Err(e) = actix_web::rt::task::spawn_blocking(move || telemetry.shutdown()).await {
        warn!("Span flush did not complete: {}", e);
    }

    served?;
    info!("Server stopped");
    Ok(())
}
