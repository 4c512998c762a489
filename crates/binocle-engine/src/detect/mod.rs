//! Automatic stereo-content detection.
//!
//! Both eye images are reduced to 8×8 through a [`SimilarityPyramid`],
//! fingerprinted by their horizontal brightness gradients, and compared.
//! Scores are averaged over a short window before the persisted
//! "content is 3D" flag is updated.

mod detector;
mod fingerprint;
mod pyramid;

pub use detector::{
    DebugCapture, DetectionState, SampleMode, SampleOutcome, SampleSource, SimilarityDetector,
    DECISION_THRESHOLD, HISTORY_LEN,
};
pub use fingerprint::{Fingerprint, GreyImage, GRID, VARIANCE_THRESHOLD};
pub use pyramid::{PyramidLevel, SimilarityPyramid, PYRAMID_LEVELS, TERMINAL_SIZE};
