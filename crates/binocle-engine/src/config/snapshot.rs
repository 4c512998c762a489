use crate::coords::Extent;

use super::keys;
use super::ConfigStore;

/// Stereo layout on the physical display.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Eyes side by side along X.
    Tall,
    /// Eyes stacked along Y.
    #[default]
    Wide,
}

impl Orientation {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Orientation::Tall),
            2 => Some(Orientation::Wide),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Orientation::Tall => 1,
            Orientation::Wide => 2,
        }
    }
}

/// Radial distortion coefficients for one color channel.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Distortion {
    pub k1: f32,
    pub k2: f32,
}

impl Distortion {
    pub const NONE: Distortion = Distortion { k1: 0.0, k2: 0.0 };

    pub const fn new(k1: f32, k2: f32) -> Self {
        Self { k1, k2 }
    }
}

/// Typed view of the stereo parameters, taken once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoConfig {
    pub red: Distortion,
    pub green: Distortion,
    pub blue: Distortion,
    pub height_scale: f32,
    pub ipd_offset: f32,
    pub ipd_scale: f32,
    pub orientation: Orientation,
    pub dispersion: bool,
    pub debug_dump_level: usize,
    /// Always at least 1.
    pub detect_rate: u32,
    pub content_is_3d: bool,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            red: Distortion::NONE,
            green: Distortion::NONE,
            blue: Distortion::NONE,
            height_scale: keys::DEFAULT_HEIGHT_SCALE,
            ipd_offset: keys::DEFAULT_IPD_OFFSET,
            ipd_scale: keys::DEFAULT_IPD_SCALE,
            orientation: Orientation::default(),
            dispersion: keys::DEFAULT_DISPERSION,
            debug_dump_level: keys::DEFAULT_DEBUG_DUMP_LEVEL as usize,
            detect_rate: keys::DEFAULT_DETECT_RATE,
            content_is_3d: keys::DEFAULT_CONTENT_IS_3D,
        }
    }
}

impl StereoConfig {
    /// Reads every stereo key from `store`.
    ///
    /// Does not touch the read-and-clear `PARAMS_CHANGED` flag.
    pub fn snapshot(store: &dyn ConfigStore) -> Self {
        let k = |key| store.get_f32(key, keys::DEFAULT_DISTORTION_K);
        let orientation = store.get_i32(keys::ORIENTATION, keys::DEFAULT_ORIENTATION);

        Self {
            red: Distortion::new(k(keys::DISTORTION_RED_K1), k(keys::DISTORTION_RED_K2)),
            green: Distortion::new(k(keys::DISTORTION_GREEN_K1), k(keys::DISTORTION_GREEN_K2)),
            blue: Distortion::new(k(keys::DISTORTION_BLUE_K1), k(keys::DISTORTION_BLUE_K2)),
            height_scale: store.get_f32(keys::HEIGHT_SCALE, keys::DEFAULT_HEIGHT_SCALE),
            ipd_offset: store.get_f32(keys::IPD_OFFSET, keys::DEFAULT_IPD_OFFSET),
            ipd_scale: store.get_f32(keys::IPD_SCALE, keys::DEFAULT_IPD_SCALE),
            orientation: Orientation::from_code(orientation).unwrap_or_else(|| {
                log::debug!("unknown orientation code {orientation}; using wide");
                Orientation::default()
            }),
            dispersion: store.get_bool(keys::DISPERSION, keys::DEFAULT_DISPERSION),
            debug_dump_level: store
                .get_i32(keys::DEBUG_DUMP_LEVEL, keys::DEFAULT_DEBUG_DUMP_LEVEL)
                .max(0) as usize,
            detect_rate: store.get_u32(keys::DETECT_RATE, keys::DEFAULT_DETECT_RATE).max(1),
            content_is_3d: store.get_bool(keys::CONTENT_IS_3D, keys::DEFAULT_CONTENT_IS_3D),
        }
    }

    /// IPD scale actually applied: an offset always wins over a scale.
    #[inline]
    pub fn effective_ipd_scale(&self) -> f32 {
        if self.ipd_offset != 0.0 { 0.0 } else { self.ipd_scale }
    }

    /// Per-eye buffer resolution for a display of size `display`.
    pub fn eye_buffer_size(&self, display: Extent) -> Extent {
        let w = display.width as f32;
        let h = display.height as f32;
        let (ew, eh) = match self.orientation {
            Orientation::Tall => (w * 0.5, h * self.height_scale),
            Orientation::Wide => (w * self.height_scale, h * 0.5),
        };
        Extent::new((ew as u32).max(1), (eh as u32).max(1))
    }
}
