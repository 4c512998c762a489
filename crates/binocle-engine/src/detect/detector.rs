use crate::backend::{RenderBackend, TargetId};
use crate::config::{keys, ConfigStore, StereoConfig};
use crate::coords::{Extent, Rect};
use crate::error::{BackendError, Result};

use super::{GreyImage, SimilarityPyramid, PYRAMID_LEVELS};

/// Valid samples averaged per decision.
pub const HISTORY_LEN: usize = 10;

/// Averages above this set the persisted 3D flag.
pub const DECISION_THRESHOLD: f32 = 0.6;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleMode {
    /// Regular per-frame call.
    Sample,
    /// Content source changed: drop the history without deciding.
    Reset,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Not a sampling frame, or nothing to sample.
    Skipped,
    /// Near-uniform frame; not counted.
    Discarded,
    Recorded { score: f32 },
    /// The history filled up and the flag was written.
    Decided { average: f32, is_3d: bool },
    Reset,
}

/// Region of a target feeding the first pyramid level.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SampleSource {
    pub target: TargetId,
    /// Normalized texture coordinates.
    pub uv: Rect,
}

impl SampleSource {
    pub fn whole(target: TargetId) -> Self {
        Self { target, uv: Rect::UNIT }
    }

    pub fn region(target: TargetId, uv: Rect) -> Self {
        Self { target, uv }
    }
}

/// Score ring and sampling cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionState {
    scores: [f32; HISTORY_LEN],
    cursor: usize,
    /// Frames since the last sample, in `[0, rate)`.
    sample_counter: u32,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self { scores: [0.0; HISTORY_LEN], cursor: 0, sample_counter: 0 }
    }
}

impl DetectionState {
    pub fn scores(&self) -> &[f32; HISTORY_LEN] {
        &self.scores
    }

    /// Valid samples accumulated towards the next decision.
    pub fn count(&self) -> usize {
        self.cursor
    }

    pub fn sample_counter(&self) -> u32 {
        self.sample_counter
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advances the cadence; true when this frame is sampled.
    fn advance(&mut self, rate: u32) -> bool {
        let rate = rate.max(1);
        if self.sample_counter >= rate {
            self.sample_counter = 0;
        }
        let due = self.sample_counter == 0;
        self.sample_counter = (self.sample_counter + 1) % rate;
        due
    }

    /// Stores a score; returns the average once the ring is full.
    fn record(&mut self, score: f32) -> Option<f32> {
        self.scores[self.cursor] = score;
        self.cursor += 1;
        if self.cursor < HISTORY_LEN {
            return None;
        }
        let average = self.scores.iter().sum::<f32>() / HISTORY_LEN as f32;
        self.scores = [0.0; HISTORY_LEN];
        self.cursor = 0;
        Some(average)
    }
}

/// Raw RGBA pixels of one pyramid level, kept for inspection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugCapture {
    pub level: usize,
    pub size: Extent,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

/// Decides whether the eye buffers hold stereo content.
#[derive(Debug, Default)]
pub struct SimilarityDetector {
    pyramid: Option<SimilarityPyramid>,
    state: DetectionState,
    debug: Option<DebugCapture>,
    left_px: Vec<u8>,
    right_px: Vec<u8>,
}

impl SimilarityDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the pyramid, or resizes it for a new primary size.
    pub fn allocate<B: RenderBackend>(&mut self, backend: &mut B, primary: Extent) -> Result<(), BackendError> {
        match &mut self.pyramid {
            Some(pyramid) => pyramid.resize(backend, primary),
            None => {
                self.pyramid = Some(SimilarityPyramid::allocate(backend, primary)?);
                Ok(())
            }
        }
    }

    pub fn release<B: RenderBackend>(&mut self, backend: &mut B) {
        if let Some(mut pyramid) = self.pyramid.take() {
            pyramid.release(backend);
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.pyramid.is_some()
    }

    pub fn pyramid(&self) -> Option<&SimilarityPyramid> {
        self.pyramid.as_ref()
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    pub fn debug_capture(&self) -> Option<&DebugCapture> {
        self.debug.as_ref()
    }

    /// Drops accumulated scores and restarts the cadence.
    pub fn reset(&mut self) {
        self.state.reset();
        log::debug!("similarity history reset");
    }

    /// Runs one detection step.
    ///
    /// Every `detect_rate`-th call downsamples both sources to 8×8, compares
    /// their fingerprints and records the score. When the history is full
    /// the average decides `CONTENT_IS_3D` in `store`.
    ///
    /// Blocks on the terminal level readback.
    pub fn sample_frame<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        left: SampleSource,
        right: SampleSource,
        mode: SampleMode,
        store: &mut dyn ConfigStore,
        config: &StereoConfig,
    ) -> Result<SampleOutcome> {
        if mode == SampleMode::Reset {
            self.reset();
            return Ok(SampleOutcome::Reset);
        }
        if !self.state.advance(config.detect_rate) {
            return Ok(SampleOutcome::Skipped);
        }
        let Some(pyramid) = &self.pyramid else {
            log::debug!("similarity sample skipped: pyramid not allocated");
            return Ok(SampleOutcome::Skipped);
        };

        pyramid.downsample(backend, left, right)?;

        let dump = config.debug_dump_level;
        if dump < PYRAMID_LEVELS - 1 {
            let level = pyramid.levels()[dump];
            let mut capture = self.debug.take().unwrap_or_default();
            backend.read_pixels(level.left, &mut capture.left)?;
            backend.read_pixels(level.right, &mut capture.right)?;
            capture.level = dump;
            capture.size = level.size;
            self.debug = Some(capture);
        }

        let Some(terminal) = pyramid.terminal() else {
            return Ok(SampleOutcome::Skipped);
        };
        backend.read_pixels(terminal.left, &mut self.left_px)?;
        backend.read_pixels(terminal.right, &mut self.right_px)?;
        let short = || BackendError::Readback("terminal level smaller than 8x8".into());
        let grey_left = GreyImage::from_rgba(&self.left_px).ok_or_else(short)?;
        let grey_right = GreyImage::from_rgba(&self.right_px).ok_or_else(short)?;

        if grey_left.is_uniform() {
            log::debug!("similarity sample discarded: variance {:.2}", grey_left.variance());
            return Ok(SampleOutcome::Discarded);
        }

        let score = grey_left.fingerprint().similarity(grey_right.fingerprint());
        match self.state.record(score) {
            None => Ok(SampleOutcome::Recorded { score }),
            Some(average) => {
                let is_3d = average > DECISION_THRESHOLD;
                store.set_bool(keys::CONTENT_IS_3D, is_3d);
                log::info!("stereo content detection: average {average:.3} -> content_is_3d={is_3d}");
                Ok(SampleOutcome::Decided { average, is_3d })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;
    use crate::backend::{Filter, TargetDesc};
    use crate::config::MemoryConfigStore;

    const PRIMARY: Extent = Extent { width: 1024, height: 512 };

    struct Rig {
        backend: RecordingBackend,
        detector: SimilarityDetector,
        store: MemoryConfigStore,
        left: TargetId,
        right: TargetId,
    }

    fn rig(left: impl Fn(u32, u32) -> u8, right: impl Fn(u32, u32) -> u8) -> Rig {
        let mut backend = RecordingBackend::new(16, 16);
        let desc = TargetDesc::new("eye", 256, 256, Filter::Nearest);
        let l = backend.create_target(&desc).unwrap();
        let r = backend.create_target(&desc).unwrap();
        backend.paint(l, |x, y| {
            let v = left(x, y);
            [v, v, v, 255]
        });
        backend.paint(r, |x, y| {
            let v = right(x, y);
            [v, v, v, 255]
        });
        let mut detector = SimilarityDetector::new();
        detector.allocate(&mut backend, PRIMARY).unwrap();
        Rig { backend, detector, store: MemoryConfigStore::new(), left: l, right: r }
    }

    fn config(rate: u32) -> StereoConfig {
        StereoConfig { detect_rate: rate, ..StereoConfig::default() }
    }

    impl Rig {
        fn sample(&mut self, mode: SampleMode, config: &StereoConfig) -> SampleOutcome {
            self.detector
                .sample_frame(
                    &mut self.backend,
                    SampleSource::whole(self.left),
                    SampleSource::whole(self.right),
                    mode,
                    &mut self.store,
                    config,
                )
                .unwrap()
        }
    }

    fn ramp(x: u32, _: u32) -> u8 {
        x as u8
    }

    // ── cadence ───────────────────────────────────────────────────────────

    #[test]
    fn samples_every_rate_th_frame() {
        let mut r = rig(ramp, ramp);
        let cfg = config(3);
        let outcomes: Vec<_> = (0..7).map(|_| r.sample(SampleMode::Sample, &cfg)).collect();
        let sampled: Vec<_> = outcomes.iter().map(|o| *o != SampleOutcome::Skipped).collect();
        assert_eq!(sampled, [true, false, false, true, false, false, true]);
        assert!(r.detector.state().sample_counter() < 3);
    }

    #[test]
    fn lowered_rate_keeps_counter_in_range() {
        let mut r = rig(ramp, ramp);
        for _ in 0..5 {
            r.sample(SampleMode::Sample, &config(10));
        }
        assert_eq!(r.detector.state().sample_counter(), 5);
        assert_ne!(r.sample(SampleMode::Sample, &config(2)), SampleOutcome::Skipped);
        assert!(r.detector.state().sample_counter() < 2);
    }

    // ── decisions ─────────────────────────────────────────────────────────

    #[test]
    fn identical_samples_average_exactly_and_set_flag() {
        let mut r = rig(ramp, ramp);
        let cfg = config(1);
        for _ in 0..HISTORY_LEN - 1 {
            assert_eq!(r.sample(SampleMode::Sample, &cfg), SampleOutcome::Recorded { score: 1.0 });
        }
        assert_eq!(
            r.sample(SampleMode::Sample, &cfg),
            SampleOutcome::Decided { average: 1.0, is_3d: true }
        );
        assert!(r.store.get_bool(keys::CONTENT_IS_3D, false));
        assert_eq!(r.detector.state().count(), 0);
    }

    #[test]
    fn average_of_equal_scores_matches_the_score() {
        // 32×32 blocks map onto single terminal pixels. Darkening the last
        // block of row 3 clears one isolated gradient bit: 63/64.
        let blocks = |x: u32, _: u32| (x / 32 * 30) as u8;
        let mut r = rig(blocks, |x, y| if x >= 224 && y / 32 == 3 { 0 } else { blocks(x, y) });
        let cfg = config(1);
        let score = 63.0 / 64.0;
        for _ in 0..HISTORY_LEN - 1 {
            assert_eq!(r.sample(SampleMode::Sample, &cfg), SampleOutcome::Recorded { score });
        }
        assert_eq!(
            r.sample(SampleMode::Sample, &cfg),
            SampleOutcome::Decided { average: score, is_3d: true }
        );
    }

    #[test]
    fn opposite_gradients_clear_flag() {
        let mut r = rig(ramp, |x, _| 255 - x as u8);
        r.store.set_bool(keys::CONTENT_IS_3D, true);
        let cfg = config(1);
        let mut last = SampleOutcome::Skipped;
        for _ in 0..HISTORY_LEN {
            last = r.sample(SampleMode::Sample, &cfg);
        }
        assert_eq!(last, SampleOutcome::Decided { average: 0.0, is_3d: false });
        assert!(!r.store.get_bool(keys::CONTENT_IS_3D, true));
    }

    #[test]
    fn uniform_frames_are_discarded_without_counting() {
        let mut r = rig(|_, _| 128, ramp);
        let cfg = config(1);
        for _ in 0..HISTORY_LEN * 2 {
            assert_eq!(r.sample(SampleMode::Sample, &cfg), SampleOutcome::Discarded);
        }
        assert_eq!(r.detector.state().count(), 0);
        assert_eq!(r.store.get(keys::CONTENT_IS_3D), None);
    }

    #[test]
    fn reset_drops_history_without_deciding() {
        let mut r = rig(ramp, ramp);
        let cfg = config(1);
        for _ in 0..4 {
            r.sample(SampleMode::Sample, &cfg);
        }
        assert_eq!(r.detector.state().count(), 4);
        assert_eq!(r.sample(SampleMode::Reset, &cfg), SampleOutcome::Reset);
        assert_eq!(*r.detector.state(), DetectionState::default());
        assert_eq!(r.store.get(keys::CONTENT_IS_3D), None);
    }

    #[test]
    fn unallocated_detector_skips() {
        let mut r = rig(ramp, ramp);
        r.detector.release(&mut r.backend);
        assert_eq!(r.backend.live_targets(), 2);
        assert_eq!(r.sample(SampleMode::Sample, &config(1)), SampleOutcome::Skipped);
    }

    // ── debug capture ─────────────────────────────────────────────────────

    #[test]
    fn non_terminal_dump_level_retains_pixels() {
        let mut r = rig(ramp, ramp);
        let cfg = StereoConfig { debug_dump_level: 4, ..config(1) };
        r.sample(SampleMode::Sample, &cfg);
        let capture = r.detector.debug_capture().unwrap();
        assert_eq!(capture.level, 4);
        assert_eq!(capture.size, Extent::new(16, 16));
        assert_eq!(capture.left.len(), 16 * 16 * 4);
    }

    #[test]
    fn terminal_dump_level_retains_nothing() {
        let mut r = rig(ramp, ramp);
        r.sample(SampleMode::Sample, &config(1));
        assert!(r.detector.debug_capture().is_none());
    }
}
