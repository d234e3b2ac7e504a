//! pothole-server: live camera page, MJPEG feed with detection overlay,
//! and the geotagged detection log.
//!
//!   /              → live view page
//!   /video_feed    → multipart/x-mixed-replace JPEG stream
//!   /map           → detections on a map

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use pothole_server::{
    config::{Cli, Settings},
    logging, router, AppState,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, config_error) = Settings::load(&cli);
    logging::init(&settings.log_file, cli.log_level).context("failed to initialise logging")?;

    if let Some(e) = config_error {
        warn!("{e:#}; using defaults");
    }
    if settings.model_path.exists() {
        info!("detection model: {}", settings.model_path.display());
    } else {
        warn!(
            "detection model {} not found; the overlay will be unavailable",
            settings.model_path.display()
        );
    }

    let state = AppState::from_settings(&settings);
    let app = router(state.clone());

    let listener = TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("cannot bind {}", settings.bind))?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    state.camera.release();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    state.begin_shutdown();
}
