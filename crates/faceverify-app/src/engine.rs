use crate::config::Config;
use faceverify_core::{
    verify_frame, ModelError, SiameseModel, SimilarityModel, Thresholds, VerificationOutcome,
    VerifyError,
};
use faceverify_hw::{Camera, CameraError, CropRegion, Frame, FrameError};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("no frame captured yet")]
    NoFrame,
    #[error("engine is busy")]
    Busy,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Anything that can produce camera frames. Implemented by [`Camera`].
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.capture_frame()
    }
}

/// Where verification reads and writes, and how it decides.
#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub crop: CropRegion,
    pub input_image: PathBuf,
    pub reference_dir: PathBuf,
    pub thresholds: Thresholds,
}

impl VerifySettings {
    pub fn from_config(config: &Config) -> Result<Self, VerifyError> {
        Ok(Self {
            crop: config.crop,
            input_image: config.input_image_path(),
            reference_dir: config.reference_dir(),
            thresholds: config.thresholds()?,
        })
    }
}

/// Messages sent from the UI / CLI to the engine thread.
enum EngineRequest {
    Capture {
        reply: oneshot::Sender<Result<Frame, EngineError>>,
    },
    Verify {
        reply: oneshot::Sender<Result<VerificationOutcome, EngineError>>,
    },
}

/// A reply that has not arrived yet; poll it from a frame loop without blocking.
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T, EngineError>>,
}

impl<T> Pending<T> {
    /// `None` while the engine is still working.
    pub fn poll(&mut self) -> Option<Result<T, EngineError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(EngineError::ChannelClosed)),
        }
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture one cropped frame and make it the current frame.
    pub async fn capture(&self) -> Result<Frame, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Capture { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Persist the current frame and verify it against the reference set.
    pub async fn verify(&self) -> Result<VerificationOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Non-blocking variant of [`capture`](Self::capture).
    pub fn request_capture(&self) -> Result<Pending<Frame>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.try_send(EngineRequest::Capture { reply })?;
        Ok(Pending { rx })
    }

    /// Non-blocking variant of [`verify`](Self::verify).
    pub fn request_verify(&self) -> Result<Pending<VerificationOutcome>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.try_send(EngineRequest::Verify { reply })?;
        Ok(Pending { rx })
    }

    fn try_send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.try_send(req).map_err(|e| match e {
            TrySendError::Full(_) => EngineError::Busy,
            TrySendError::Closed(_) => EngineError::ChannelClosed,
        })
    }
}

/// Engine state, owned by the engine thread.
struct Engine<S, M> {
    source: S,
    model: M,
    settings: VerifySettings,
    /// Most recent cropped frame; the only frame verification ever sees.
    current: Option<Frame>,
}

impl<S: FrameSource, M: SimilarityModel> Engine<S, M> {
    fn capture(&mut self) -> Result<Frame, EngineError> {
        let frame = self.source.next_frame()?;
        let cropped = frame.crop(&self.settings.crop)?;
        self.current = Some(cropped.clone());
        Ok(cropped)
    }

    fn verify(&mut self) -> Result<VerificationOutcome, EngineError> {
        let frame = self.current.as_ref().ok_or(EngineError::NoFrame)?;
        let image = frame.to_rgb_image()?;
        let outcome = verify_frame(
            &mut self.model,
            &image,
            &self.settings.input_image,
            &self.settings.reference_dir,
            &self.settings.thresholds,
        )?;
        Ok(outcome)
    }

    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Capture { reply } => {
                let result = self.capture();
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "capture skipped");
                }
                let _ = reply.send(result);
            }
            EngineRequest::Verify { reply } => {
                let result = self.verify();
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "verification failed");
                }
                let _ = reply.send(result);
            }
        }
    }
}

/// Open the camera and load the model, then start the engine thread.
///
/// Fails fast at startup if either resource is unavailable. The camera is
/// released when the last [`EngineHandle`] is dropped and the thread exits.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let settings = VerifySettings::from_config(config)?;

    let mut camera = Camera::open(config.camera_index)?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );
    if !settings.crop.fits(camera.width, camera.height) {
        tracing::warn!(
            crop = ?settings.crop,
            width = camera.width,
            height = camera.height,
            "crop region does not fit the camera resolution; every capture will fail"
        );
    }

    let model_path = config.model_path();
    let model = SiameseModel::load(&model_path)?;
    tracing::info!(path = %model_path.display(), "Siamese model loaded");

    camera.warm_up(config.warmup_frames);

    spawn_with(camera, model, settings)
}

/// Start the engine thread around an already-open frame source and model.
pub fn spawn_with<S, M>(source: S, model: M, settings: VerifySettings) -> Result<EngineHandle, EngineError>
where
    S: FrameSource + Send + 'static,
    M: SimilarityModel + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let mut engine = Engine {
        source,
        model,
        settings,
        current: None,
    };

    std::thread::Builder::new()
        .name("faceverify-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
