//! Verification decision: score the input image against every reference and
//! reduce the scores to pass/fail with two thresholds.

use crate::input::{self, PersistError};
use crate::model::{ModelError, SimilarityModel};
use crate::preprocess::{self, PreprocessError};
use crate::references::{self, ReferenceError};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("reference directory {0} contains no images")]
    EmptyReferenceSet(PathBuf),
    #[error("no scores to aggregate")]
    NoScores,
    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error(transparent)]
    References(#[from] ReferenceError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// The two cut-offs of the decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    /// A single score must be strictly above this to count as a positive.
    pub detection: f32,
    /// The fraction of positives must be strictly above this to verify.
    pub verification: f32,
}

impl Thresholds {
    pub fn new(detection: f32, verification: f32) -> Result<Self, VerifyError> {
        if !detection.is_finite() {
            return Err(VerifyError::InvalidThreshold(format!(
                "detection threshold must be finite, got {detection}"
            )));
        }
        if !(0.0..=1.0).contains(&verification) {
            return Err(VerifyError::InvalidThreshold(format!(
                "verification threshold must be within [0, 1], got {verification}"
            )));
        }
        Ok(Self {
            detection,
            verification,
        })
    }
}

/// Aggregate of one set of scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    /// Scores above the detection threshold.
    pub positives: usize,
    /// Number of references compared.
    pub total: usize,
    /// `positives / total`.
    pub ratio: f32,
    pub verified: bool,
}

/// One (input, reference) comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceScore {
    pub reference: PathBuf,
    pub score: f32,
}

/// Result of a full verification run.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub scores: Vec<ReferenceScore>,
    #[serde(flatten)]
    pub decision: Decision,
}

impl VerificationOutcome {
    pub fn verified(&self) -> bool {
        self.decision.verified
    }
}

/// Reduce raw scores to a decision.
///
/// An empty score list has no defined ratio and is rejected.
pub fn decide(scores: &[f32], thresholds: &Thresholds) -> Result<Decision, VerifyError> {
    let total = scores.len();
    if total == 0 {
        return Err(VerifyError::NoScores);
    }

    let positives = scores.iter().filter(|&&s| s > thresholds.detection).count();
    let ratio = positives as f32 / total as f32;

    Ok(Decision {
        positives,
        total,
        ratio,
        verified: ratio > thresholds.verification,
    })
}

/// Persist `frame` to `input_path`, then verify it.
pub fn verify_frame<M: SimilarityModel + ?Sized>(
    model: &mut M,
    frame: &RgbImage,
    input_path: &Path,
    reference_dir: &Path,
    thresholds: &Thresholds,
) -> Result<VerificationOutcome, VerifyError> {
    input::persist(frame, input_path)?;
    verify(model, input_path, reference_dir, thresholds)
}

/// Compare the image at `input_path` against every image in `reference_dir`.
///
/// The input file is read once, at call time; whatever it contains then is
/// what gets verified.
pub fn verify<M: SimilarityModel + ?Sized>(
    model: &mut M,
    input_path: &Path,
    reference_dir: &Path,
    thresholds: &Thresholds,
) -> Result<VerificationOutcome, VerifyError> {
    let references = references::scan(reference_dir)?;
    if references.is_empty() {
        return Err(VerifyError::EmptyReferenceSet(reference_dir.to_path_buf()));
    }

    let input = preprocess::load_tensor(input_path)?;

    let mut scores = Vec::with_capacity(references.len());
    for reference in references {
        let tensor = preprocess::load_tensor(&reference)?;
        let score = model.score(&input, &tensor)?;
        tracing::debug!(reference = %reference.display(), score, "scored reference");
        scores.push(ReferenceScore { reference, score });
    }

    let raw: Vec<f32> = scores.iter().map(|s| s.score).collect();
    let decision = decide(&raw, thresholds)?;

    tracing::info!(
        positives = decision.positives,
        total = decision.total,
        ratio = decision.ratio,
        verified = decision.verified,
        "verification complete"
    );

    Ok(VerificationOutcome { scores, decision })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::ImageTensor;
    use image::Rgb;
    use rstest::rstest;
    use std::collections::VecDeque;

    /// Returns preset scores in call order.
    struct ScriptedModel {
        scores: VecDeque<f32>,
        calls: usize,
    }

    impl ScriptedModel {
        fn new(scores: &[f32]) -> Self {
            Self {
                scores: scores.iter().copied().collect(),
                calls: 0,
            }
        }
    }

    impl SimilarityModel for ScriptedModel {
        fn score(&mut self, input: &ImageTensor, reference: &ImageTensor) -> Result<f32, ModelError> {
            assert_eq!(input.shape(), reference.shape());
            self.calls += 1;
            self.scores
                .pop_front()
                .ok_or_else(|| ModelError::InferenceFailed("script exhausted".into()))
        }
    }

    fn thresholds(detection: f32, verification: f32) -> Thresholds {
        Thresholds::new(detection, verification).unwrap()
    }

    fn write_image(path: &Path, shade: u8) {
        RgbImage::from_pixel(120, 120, Rgb([shade, shade, shade]))
            .save(path)
            .unwrap();
    }

    fn fixture(references: usize) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input_image").join("input_image.jpg");
        std::fs::create_dir_all(input.parent().unwrap()).unwrap();
        write_image(&input, 128);

        let refs = dir.path().join("verification_images");
        std::fs::create_dir(&refs).unwrap();
        for i in 0..references {
            write_image(&refs.join(format!("ref_{i}.png")), (i * 20) as u8);
        }
        (dir, input, refs)
    }

    #[rstest]
    #[case(vec![0.9, 0.6, 0.4, 0.95, 0.99], 4, false)]
    #[case(vec![0.9, 0.9, 0.9, 0.9, 0.1], 4, false)]
    #[case(vec![0.9, 0.51, 0.6, 0.7, 0.99], 5, true)]
    #[case(vec![0.1, 0.2, 0.3, 0.4, 0.5], 0, false)]
    fn test_decide_scenarios(
        #[case] scores: Vec<f32>,
        #[case] positives: usize,
        #[case] verified: bool,
    ) {
        let decision = decide(&scores, &thresholds(0.5, 0.8)).unwrap();
        assert_eq!(decision.positives, positives);
        assert_eq!(decision.total, 5);
        assert_eq!(decision.ratio, positives as f32 / 5.0);
        assert_eq!(decision.verified, verified);
    }

    #[test]
    fn test_ratio_equal_to_threshold_is_not_verified() {
        let decision = decide(&[0.9, 0.6, 0.4, 0.95, 0.99], &thresholds(0.5, 0.8)).unwrap();
        assert_eq!(decision.ratio, 0.8);
        assert!(!decision.verified);
    }

    #[test]
    fn test_score_equal_to_detection_threshold_is_not_positive() {
        let decision = decide(&[0.5, 0.5], &thresholds(0.5, 0.0)).unwrap();
        assert_eq!(decision.positives, 0);
        assert!(!decision.verified);
    }

    #[test]
    fn test_ratio_is_exact_fraction() {
        for total in 1..=12usize {
            for k in 0..=total {
                let scores: Vec<f32> = (0..total).map(|i| if i < k { 0.9 } else { 0.1 }).collect();
                let decision = decide(&scores, &thresholds(0.5, 0.5)).unwrap();
                assert_eq!(decision.positives, k);
                assert_eq!(decision.ratio, k as f32 / total as f32);
                assert_eq!(decision.verified, decision.ratio > 0.5);
            }
        }
    }

    #[test]
    fn test_decide_empty_is_error() {
        let result = decide(&[], &thresholds(0.5, 0.5));
        assert!(matches!(result, Err(VerifyError::NoScores)));
    }

    #[rstest]
    #[case(f32::NAN, 0.5)]
    #[case(0.5, f32::NAN)]
    #[case(0.5, 1.5)]
    #[case(0.5, -0.1)]
    fn test_invalid_thresholds(#[case] detection: f32, #[case] verification: f32) {
        assert!(matches!(
            Thresholds::new(detection, verification),
            Err(VerifyError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_verify_scores_every_reference() {
        let (_dir, input, refs) = fixture(5);
        let mut model = ScriptedModel::new(&[0.9, 0.6, 0.4, 0.95, 0.99]);

        let outcome = verify(&mut model, &input, &refs, &thresholds(0.5, 0.8)).unwrap();
        assert_eq!(model.calls, 5);
        assert_eq!(outcome.scores.len(), 5);
        assert_eq!(outcome.decision.positives, 4);
        assert!(!outcome.verified());
        // Sorted by name, so scores line up with ref_0..ref_4
        assert!(outcome.scores[2].reference.ends_with("ref_2.png"));
        assert_eq!(outcome.scores[2].score, 0.4);
    }

    #[test]
    fn test_verify_all_positive() {
        let (_dir, input, refs) = fixture(5);
        let mut model = ScriptedModel::new(&[0.9; 5]);
        let outcome = verify(&mut model, &input, &refs, &thresholds(0.5, 0.8)).unwrap();
        assert_eq!(outcome.decision.ratio, 1.0);
        assert!(outcome.verified());
    }

    #[test]
    fn test_verify_empty_reference_dir() {
        let (_dir, input, refs) = fixture(0);
        let mut model = ScriptedModel::new(&[]);
        let result = verify(&mut model, &input, &refs, &thresholds(0.5, 0.5));
        assert!(matches!(result, Err(VerifyError::EmptyReferenceSet(p)) if p == refs));
        assert_eq!(model.calls, 0);
    }

    #[test]
    fn test_verify_missing_input_image() {
        let (dir, _input, refs) = fixture(2);
        let mut model = ScriptedModel::new(&[0.9, 0.9]);
        let missing = dir.path().join("nowhere.jpg");
        let result = verify(&mut model, &missing, &refs, &thresholds(0.5, 0.5));
        assert!(matches!(
            result,
            Err(VerifyError::Preprocess(PreprocessError::Read { .. }))
        ));
    }

    #[test]
    fn test_verify_undecodable_reference() {
        let (_dir, input, refs) = fixture(1);
        std::fs::write(refs.join("notes.txt"), b"hello").unwrap();
        let mut model = ScriptedModel::new(&[0.9, 0.9]);
        let result = verify(&mut model, &input, &refs, &thresholds(0.5, 0.5));
        assert!(matches!(
            result,
            Err(VerifyError::Preprocess(PreprocessError::Decode { .. }))
        ));
    }

    #[test]
    fn test_verify_frame_overwrites_input() {
        let (_dir, input, refs) = fixture(2);
        let frame = RgbImage::from_pixel(250, 250, Rgb([30, 60, 90]));
        let mut model = ScriptedModel::new(&[0.9, 0.2]);

        let outcome = verify_frame(&mut model, &frame, &input, &refs, &thresholds(0.5, 0.4)).unwrap();
        assert_eq!(outcome.decision.ratio, 0.5);
        assert!(outcome.verified());

        let persisted = image::open(&input).unwrap();
        assert_eq!((persisted.width(), persisted.height()), (250, 250));
    }

    #[test]
    fn test_verify_model_failure_propagates() {
        let (_dir, input, refs) = fixture(3);
        let mut model = ScriptedModel::new(&[0.9]);
        let result = verify(&mut model, &input, &refs, &thresholds(0.5, 0.5));
        assert!(matches!(result, Err(VerifyError::Model(_))));
    }
}
