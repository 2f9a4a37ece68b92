use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use faceverify_app::{spawn_engine, Config};
use faceverify_core::{input, preprocess, references, SiameseModel, SimilarityModel};
use faceverify_hw::Camera;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "faceverify-cli", about = "Face verification against a reference image set")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a frame and verify it against the reference images
    Verify,
    /// Score two image files with the similarity model
    Score {
        /// Input image
        input: PathBuf,
        /// Reference image
        reference: PathBuf,
    },
    /// List the reference images
    References,
    /// Run camera diagnostics
    Test {
        /// Number of frames to capture
        #[arg(short, long, default_value_t = 5)]
        frames: usize,
        /// Save the last cropped frame to this path
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Verify => return verify(&config).await,
        Commands::Score { input, reference } => score(&config, &input, &reference)?,
        Commands::References => list_references(&config)?,
        Commands::Test { frames, save } => camera_test(&config, frames, save)?,
        Commands::Devices => list_devices(),
    }

    Ok(ExitCode::SUCCESS)
}

async fn verify(config: &Config) -> Result<ExitCode> {
    let engine = spawn_engine(config).context("failed to start engine")?;
    engine.capture().await.context("failed to capture frame")?;
    let outcome = engine.verify().await.context("verification failed")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("{}", if outcome.verified() { "Verified" } else { "Unverified" });

    Ok(if outcome.verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn score(config: &Config, input: &std::path::Path, reference: &std::path::Path) -> Result<()> {
    let mut model = SiameseModel::load(&config.model_path())?;
    let a = preprocess::load_tensor(input)?;
    let b = preprocess::load_tensor(reference)?;
    let score = model.score(&a, &b)?;

    let thresholds = config.thresholds()?;
    println!(
        "{}",
        serde_json::json!({
            "input": input,
            "reference": reference,
            "score": score,
            "positive": score > thresholds.detection,
        })
    );
    Ok(())
}

fn list_references(config: &Config) -> Result<()> {
    let dir = config.reference_dir();
    let paths = references::scan(&dir)?;
    if paths.is_empty() {
        bail!("reference directory {} contains no images", dir.display());
    }
    for path in &paths {
        println!("{}", path.display());
    }
    println!("{} reference image(s) in {}", paths.len(), dir.display());
    Ok(())
}

fn camera_test(config: &Config, frames: usize, save: Option<PathBuf>) -> Result<()> {
    println!("Running camera diagnostics...");
    let mut camera = Camera::open(config.camera_index)?;
    println!(
        "device: {}  resolution: {}x{}  format: {:?}",
        camera.device_path,
        camera.width,
        camera.height,
        camera.pixel_format()
    );

    let crop = config.crop;
    if crop.fits(camera.width, camera.height) {
        println!(
            "crop: {}x{}+{}+{} fits",
            crop.width, crop.height, crop.x, crop.y
        );
    } else {
        println!(
            "crop: {}x{}+{}+{} does NOT fit a {}x{} frame",
            crop.width, crop.height, crop.x, crop.y, camera.width, camera.height
        );
    }

    let mut last = None;
    for i in 0..frames {
        match camera.capture_frame() {
            Ok(frame) => {
                println!(
                    "frame {i}: seq={} brightness={:.1} dark={}",
                    frame.sequence,
                    frame.avg_brightness(),
                    frame.is_dark
                );
                last = Some(frame);
            }
            Err(e) => println!("frame {i}: {e}"),
        }
    }

    if let Some(path) = save {
        let Some(frame) = last else {
            bail!("no frame captured, nothing to save");
        };
        let cropped = frame.crop(&crop)?;
        input::persist(&cropped.to_rgb_image()?, &path)?;
        println!("saved cropped frame to {}", path.display());
    }
    Ok(())
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for dev in devices {
        println!(
            "[{}] {}  {} ({}, {})",
            dev.index, dev.path, dev.name, dev.driver, dev.bus
        );
    }
}
