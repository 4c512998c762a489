//! Configuration keys and their documented defaults.

pub const DISTORTION_RED_K1: &str = "stereo.distortion.red.k1";
pub const DISTORTION_RED_K2: &str = "stereo.distortion.red.k2";
pub const DISTORTION_GREEN_K1: &str = "stereo.distortion.green.k1";
pub const DISTORTION_GREEN_K2: &str = "stereo.distortion.green.k2";
pub const DISTORTION_BLUE_K1: &str = "stereo.distortion.blue.k1";
pub const DISTORTION_BLUE_K2: &str = "stereo.distortion.blue.k2";

/// Fraction of the display taken by one eye along the non-split axis.
pub const HEIGHT_SCALE: &str = "stereo.height_scale";
pub const IPD_OFFSET: &str = "stereo.ipd.offset";
pub const IPD_SCALE: &str = "stereo.ipd.scale";
/// `1` = tall layout, `2` = wide layout.
pub const ORIENTATION: &str = "stereo.orientation";
pub const DISPERSION: &str = "stereo.dispersion";
/// Similarity pyramid level whose pixels are retained for inspection.
pub const DEBUG_DUMP_LEVEL: &str = "stereo.debug.dump_level";
/// Similarity is sampled every `rate`-th frame.
pub const DETECT_RATE: &str = "stereo.detect.rate";
/// Read-and-clear: set by whoever edits the parameters above.
pub const PARAMS_CHANGED: &str = "stereo.params_changed";
/// Written by the detector.
pub const CONTENT_IS_3D: &str = "stereo.content_is_3d";

pub const DEFAULT_DISTORTION_K: f32 = 0.0;
pub const DEFAULT_HEIGHT_SCALE: f32 = 0.5;
pub const DEFAULT_IPD_OFFSET: f32 = 0.0;
pub const DEFAULT_IPD_SCALE: f32 = 0.0;
pub const DEFAULT_ORIENTATION: i32 = 2;
pub const DEFAULT_DISPERSION: bool = false;
pub const DEFAULT_DEBUG_DUMP_LEVEL: i32 = 5;
pub const DEFAULT_DETECT_RATE: u32 = 10;
/// A fresh process always builds its meshes once.
pub const DEFAULT_PARAMS_CHANGED: bool = true;
pub const DEFAULT_CONTENT_IS_3D: bool = false;
