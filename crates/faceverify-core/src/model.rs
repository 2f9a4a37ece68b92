//! Siamese similarity model via ONNX Runtime.
//!
//! The network takes two preprocessed 105x105 RGB images and returns a
//! single sigmoid score: close to 1.0 when both show the same person.

use crate::preprocess::ImageTensor;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0} — export the trained Siamese network to ONNX and place it there")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scores how similar two preprocessed images are.
///
/// Higher means more similar. Implementations own any inference state,
/// hence `&mut self`.
pub trait SimilarityModel {
    fn score(&mut self, input: &ImageTensor, reference: &ImageTensor) -> Result<f32, ModelError>;
}

/// Siamese network loaded from an ONNX file.
///
/// Expects two inputs in the order (input image, reference image) and
/// reads the score from the first element of the first output.
pub struct SiameseModel {
    session: Session,
}

impl SiameseModel {
    /// Load the ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_inputs = session.inputs().len();
        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded Siamese model"
        );

        if num_inputs != 2 {
            return Err(ModelError::InferenceFailed(format!(
                "Siamese model requires 2 inputs (input image, reference image), got {num_inputs}"
            )));
        }

        Ok(Self { session })
    }
}

impl SimilarityModel for SiameseModel {
    fn score(&mut self, input: &ImageTensor, reference: &ImageTensor) -> Result<f32, ModelError> {
        let outputs = self.session.run(ort::inputs![
            TensorRef::from_array_view(input.view())?,
            TensorRef::from_array_view(reference.view())?
        ])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("score extraction: {e}")))?;

        first_score(raw)
    }
}

/// The network emits a `[1, 1]` tensor; anything with no elements is a broken export.
fn first_score(raw: &[f32]) -> Result<f32, ModelError> {
    raw.first().copied().ok_or_else(|| {
        ModelError::InferenceFailed("model produced an empty output tensor".to_string())
    })
}
