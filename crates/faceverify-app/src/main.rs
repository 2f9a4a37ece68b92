use anyhow::{Context, Result};
use eframe::egui;
use faceverify_app::{spawn_engine, Config};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod ui;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceverify starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        camera = config.camera_index,
        references = %config.reference_dir().display(),
        input = %config.input_image_path().display(),
        detection_threshold = config.detection_threshold,
        verification_threshold = config.verification_threshold,
        "configuration loaded"
    );

    let engine = spawn_engine(&config).context("failed to start engine")?;
    let refresh = Duration::from_millis(config.refresh_interval_ms);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Face Verification")
            .with_inner_size([300.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(
        "faceverify",
        options,
        Box::new(move |_cc| {
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(Box::new(ui::VerifyApp::new(
                engine, refresh,
            )))
        }),
    )
    .map_err(|e| anyhow::anyhow!("window closed with error: {e}"))?;

    tracing::info!("faceverify shutting down");
    Ok(())
}
