//! Desktop window: live preview, Verify button, status label.

use eframe::{egui, App, Frame as AppFrame};
use faceverify_app::{EngineError, EngineHandle, Pending};
use faceverify_core::VerificationOutcome;
use faceverify_hw::Frame;
use std::time::{Duration, Instant};

const PREVIEW_TEXTURE: &str = "preview";

/// What the status label shows.
#[derive(Debug, Clone, PartialEq)]
enum Status {
    Idle,
    Verifying,
    Verified { positives: usize, total: usize },
    Unverified { positives: usize, total: usize },
    Error(String),
}

impl Status {
    fn from_outcome(result: Result<VerificationOutcome, EngineError>) -> Self {
        match result {
            Ok(outcome) => {
                let positives = outcome.decision.positives;
                let total = outcome.decision.total;
                if outcome.verified() {
                    Status::Verified { positives, total }
                } else {
                    Status::Unverified { positives, total }
                }
            }
            Err(e) => Status::Error(e.to_string()),
        }
    }

    fn text(&self) -> String {
        match self {
            Status::Idle => String::new(),
            Status::Verifying => "Verifying...".to_string(),
            Status::Verified { positives, total } => format!("Verified ({positives}/{total})"),
            Status::Unverified { positives, total } => {
                format!("Unverified ({positives}/{total})")
            }
            Status::Error(msg) => format!("Error: {msg}"),
        }
    }

    fn color(&self) -> egui::Color32 {
        match self {
            Status::Verified { .. } => egui::Color32::DARK_GREEN,
            Status::Unverified { .. } | Status::Error(_) => egui::Color32::DARK_RED,
            Status::Idle | Status::Verifying => egui::Color32::GRAY,
        }
    }
}

pub struct VerifyApp {
    engine: EngineHandle,
    refresh: Duration,
    preview: Option<egui::TextureHandle>,
    pending_frame: Option<Pending<Frame>>,
    pending_verify: Option<Pending<VerificationOutcome>>,
    last_capture: Option<Instant>,
    /// Last capture error shown, so a broken camera does not flood the log.
    capture_error: Option<String>,
    status: Status,
}

impl VerifyApp {
    pub fn new(engine: EngineHandle, refresh: Duration) -> Self {
        Self {
            engine,
            refresh,
            preview: None,
            pending_frame: None,
            pending_verify: None,
            last_capture: None,
            capture_error: None,
            status: Status::Idle,
        }
    }

    fn request_frame_if_due(&mut self) {
        if self.pending_frame.is_some() {
            return;
        }
        let due = self
            .last_capture
            .is_none_or(|t| t.elapsed() >= self.refresh);
        if !due {
            return;
        }
        match self.engine.request_capture() {
            Ok(pending) => {
                self.pending_frame = Some(pending);
                self.last_capture = Some(Instant::now());
            }
            Err(EngineError::Busy) => {}
            Err(e) => self.status = Status::Error(e.to_string()),
        }
    }

    fn poll_frame(&mut self, ctx: &egui::Context) {
        let Some(result) = self.pending_frame.as_mut().and_then(Pending::poll) else {
            return;
        };
        self.pending_frame = None;

        match result {
            Ok(frame) => {
                self.capture_error = None;
                let image = egui::ColorImage::from_rgb(
                    [frame.width as usize, frame.height as usize],
                    &frame.data,
                );
                match &mut self.preview {
                    Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                    None => {
                        self.preview =
                            Some(ctx.load_texture(PREVIEW_TEXTURE, image, egui::TextureOptions::LINEAR))
                    }
                }
            }
            // No frame this tick: keep the last preview.
            Err(e) => {
                let msg = e.to_string();
                if self.capture_error.as_deref() != Some(msg.as_str()) {
                    tracing::warn!(error = %msg, "capture failed");
                    self.capture_error = Some(msg);
                }
            }
        }
    }

    fn start_verification(&mut self) {
        match self.engine.request_verify() {
            Ok(pending) => {
                self.pending_verify = Some(pending);
                self.status = Status::Verifying;
            }
            Err(e) => self.status = Status::Error(e.to_string()),
        }
    }

    fn poll_verification(&mut self) {
        let Some(result) = self.pending_verify.as_mut().and_then(Pending::poll) else {
            return;
        };
        self.pending_verify = None;
        self.status = Status::from_outcome(result);
        tracing::info!(status = %self.status.text(), "verification finished");
    }
}

impl App for VerifyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut AppFrame) {
        self.poll_frame(ctx);
        self.poll_verification();
        self.request_frame_if_due();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                match &self.preview {
                    Some(texture) => {
                        ui.image(egui::load::SizedTexture::from_handle(texture));
                    }
                    None => {
                        ui.add_space(100.0);
                        let msg = self
                            .capture_error
                            .as_deref()
                            .unwrap_or("Waiting for camera...");
                        ui.label(msg);
                        ui.add_space(100.0);
                    }
                }

                ui.add_space(20.0);
                let idle = self.pending_verify.is_none();
                let button = egui::Button::new(egui::RichText::new("Verify").size(15.0));
                if ui.add_enabled(idle, button).clicked() {
                    self.start_verification();
                }

                ui.add_space(20.0);
                ui.label(
                    egui::RichText::new(self.status.text())
                        .size(15.0)
                        .color(egui::Color32::WHITE)
                        .background_color(self.status.color()),
                );
            });
        });

        ctx.request_repaint_after(self.refresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceverify_core::{Decision, ReferenceScore};
    use std::path::PathBuf;

    fn outcome(positives: usize, total: usize, verified: bool) -> VerificationOutcome {
        VerificationOutcome {
            scores: (0..total)
                .map(|i| ReferenceScore {
                    reference: PathBuf::from(format!("{i}.jpg")),
                    score: if i < positives { 0.9 } else { 0.1 },
                })
                .collect(),
            decision: Decision {
                positives,
                total,
                ratio: positives as f32 / total as f32,
                verified,
            },
        }
    }

    #[test]
    fn test_status_from_outcome() {
        assert_eq!(
            Status::from_outcome(Ok(outcome(5, 5, true))),
            Status::Verified {
                positives: 5,
                total: 5
            }
        );
        assert_eq!(
            Status::from_outcome(Ok(outcome(4, 5, false))).text(),
            "Unverified (4/5)"
        );
    }

    #[test]
    fn test_status_from_error() {
        let status = Status::from_outcome(Err(EngineError::NoFrame));
        assert_eq!(status.text(), "Error: no frame captured yet");
        assert_eq!(status.color(), egui::Color32::DARK_RED);
    }
}
