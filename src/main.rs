use sales_revenue_api::{
    build_router, config, handlers::health::init_start_time, services::PredictionService,
    AppState,
};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);
    init_start_time();

    info!(
        environment = %cfg.environment,
        preprocessor = %cfg.preprocessor_path.display(),
        model = %cfg.model_path.display(),
        "Loading prediction pipeline"
    );

    // Predictions are impossible without both artifacts, so refuse to start.
    let predictor = PredictionService::from_config(&cfg).map_err(|e| {
        error!("Failed to load prediction pipeline: {}", e);
        e
    })?;

    let summary = predictor.summary();
    info!(
        model = %summary.model_kind,
        features = summary.model_features,
        "Prediction pipeline ready"
    );

    let addr = cfg.bind_address();
    let app = build_router(AppState::new(cfg, predictor));

    // Bind and serve
    info!("sales-revenue-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
