//! faceverify-hw — Hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access and the RGB frame type shared by the
//! preview loop and the verification engine.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{CropRegion, Frame, FrameError};
