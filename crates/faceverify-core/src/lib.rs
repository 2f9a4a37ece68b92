//! faceverify-core — Face verification against a reference image set.
//!
//! A Siamese network (ONNX Runtime, CPU) scores the captured input image
//! against each stored reference; the scores are reduced to pass/fail with a
//! detection threshold and a verification threshold.

pub mod input;
pub mod model;
pub mod preprocess;
pub mod references;
pub mod verifier;

pub use model::{ModelError, SiameseModel, SimilarityModel};
pub use preprocess::{ImageTensor, PreprocessError, INPUT_SIZE};
pub use verifier::{
    decide, verify, verify_frame, Decision, ReferenceScore, Thresholds, VerificationOutcome,
    VerifyError,
};
