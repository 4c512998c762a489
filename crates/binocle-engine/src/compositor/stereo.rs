use crate::backend::{Filter, RenderBackend, TargetDesc, TargetId, WarpParams};
use crate::config::{keys, ConfigStore, StereoConfig};
use crate::coords::{ColorMatrix, Extent, Rect};
use crate::detect::{SampleMode, SampleOutcome, SampleSource, SimilarityDetector};
use crate::error::{BackendError, CompositorError, Result};
use crate::warp::{Eye, WarpMeshGenerator};

use super::shared::CompositorCore;
use super::{Compositor, CompositorKind, DisplayId, EyeDraw, GroupMode, PerDisplayState, DISPLAY_COUNT};

/// Stereo compositor: per-display eye buffers, lens warp and content
/// detection on top of the plain group stack.
#[derive(Debug)]
pub struct StereoCompositor {
    core: CompositorCore,
    displays: Vec<PerDisplayState>,
    active: DisplayId,
    generator: WarpMeshGenerator,
    detector: SimilarityDetector,
    config: StereoConfig,
    /// Global parameters-changed signal taken in `begin_frame`.
    params_changed: bool,
    eyes_allocated: bool,
    right_eye_rendered: bool,
}

impl Default for StereoCompositor {
    fn default() -> Self {
        Self {
            core: CompositorCore::default(),
            displays: vec![PerDisplayState::default(); DISPLAY_COUNT],
            active: DisplayId::PRIMARY,
            generator: WarpMeshGenerator::new(),
            detector: SimilarityDetector::new(),
            config: StereoConfig::default(),
            params_changed: false,
            eyes_allocated: false,
            right_eye_rendered: false,
        }
    }
}

impl StereoCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_display(&self) -> DisplayId {
        self.active
    }

    pub fn display(&self, id: DisplayId) -> Option<&PerDisplayState> {
        self.displays.get(id.index())
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    pub fn detector(&self) -> &SimilarityDetector {
        &self.detector
    }

    /// Clears both eye buffers of the active display, and the capture
    /// target if one is attached, to transparent black. Leaves the default
    /// target bound.
    pub fn clear_eye_targets<B: RenderBackend>(&mut self, backend: &mut B) {
        let display = &self.displays[self.active.index()];
        let targets = [self.core.capture.target(), display.left, display.right];
        for target in targets.into_iter().flatten() {
            backend.bind_target(Some(target));
            backend.clear([0.0; 4]);
        }
        backend.bind_target(None);
    }

    /// Everything a stereo group needs before eye content is drawn.
    fn prepare<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        if !self.eyes_allocated {
            self.allocate_eyes(backend)?;
        }

        if std::mem::take(&mut self.params_changed) {
            for id in DisplayId::all() {
                self.refresh_mesh(backend, id)?;
            }
        } else if self.displays[self.active.index()].recompute {
            self.refresh_mesh(backend, self.active)?;
        }

        // Allocates on first use, then follows the primary size.
        self.detector.allocate(backend, self.displays[DisplayId::PRIMARY.index()].size)?;
        self.resize_eyes(backend)
    }

    /// Creates both eye buffers of every display. On failure, the buffers
    /// created so far are freed and no display is touched.
    fn allocate_eyes<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        let mut pairs = Vec::with_capacity(DISPLAY_COUNT);
        for display in &self.displays {
            let size = display.size.halved();
            let desc = TargetDesc::new("eye buffer", size.width, size.height, Filter::Linear);
            match create_eye_pair(backend, &desc) {
                Ok((left, right)) => pairs.push((left, right, size)),
                Err(e) => {
                    for (left, right, _) in pairs {
                        backend.release_target(left);
                        backend.release_target(right);
                    }
                    return Err(e.into());
                }
            }
        }
        for (display, (left, right, size)) in self.displays.iter_mut().zip(pairs) {
            display.left = Some(left);
            display.right = Some(right);
            display.eye_size = size;
        }
        self.eyes_allocated = true;
        log::debug!("eye buffers allocated for {DISPLAY_COUNT} displays");
        Ok(())
    }

    fn refresh_mesh<B: RenderBackend>(&mut self, backend: &mut B, id: DisplayId) -> Result<()> {
        let display = &mut self.displays[id.index()];
        if !display.size.is_valid() {
            return Ok(());
        }
        let mesh = self.generator.regenerate(backend, id, display.size, &self.config)?;
        display.replace_mesh(backend, mesh);
        Ok(())
    }

    /// Resizes the active display's eye buffers to the configured resolution.
    fn resize_eyes<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        let display = &mut self.displays[self.active.index()];
        let want = self.config.eye_buffer_size(display.size);
        if want == display.eye_size {
            return Ok(());
        }
        let (left, right) = display.eye_targets().ok_or(CompositorError::MissingEyeTargets)?;
        backend.resize_target(left, want.width, want.height)?;
        backend.resize_target(right, want.width, want.height)?;
        log::debug!(
            "{:?} eye buffers {}x{} -> {}x{}",
            self.active,
            display.eye_size.width,
            display.eye_size.height,
            want.width,
            want.height
        );
        display.eye_size = want;
        Ok(())
    }

    /// Draws both warped eyes into `destination`.
    fn warp_pass<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        destination: Option<TargetId>,
        color_transform: ColorMatrix,
    ) -> Result<()> {
        let right_rendered = std::mem::take(&mut self.right_eye_rendered);
        let display = &self.displays[self.active.index()];
        let (left, right) = display.eye_targets().ok_or(CompositorError::MissingEyeTargets)?;
        let Some(mesh) = display.mesh else {
            log::warn!("no warp mesh for {:?}; skipping warp pass", self.active);
            return Ok(());
        };

        let lens = self.active.is_primary();
        let params = |eye| WarpParams {
            eye,
            distortion: lens,
            fog_border: lens,
            dispersion: lens && self.config.dispersion,
            color_transform,
        };

        backend.bind_target(destination);
        backend.set_blending(false);
        backend.draw_warp(left, mesh, &params(Eye::Left))?;
        // Mono content: the left buffer feeds both eyes.
        let right_source = if right_rendered { right } else { left };
        backend.draw_warp(right_source, mesh, &params(Eye::Right))?;
        Ok(())
    }
}

fn create_eye_pair<B: RenderBackend>(
    backend: &mut B,
    desc: &TargetDesc,
) -> std::result::Result<(TargetId, TargetId), BackendError> {
    let left = backend.create_target(desc)?;
    match backend.create_target(desc) {
        Ok(right) => Ok((left, right)),
        Err(e) => {
            backend.release_target(left);
            Err(e)
        }
    }
}

impl<B: RenderBackend> Compositor<B> for StereoCompositor {
    fn kind(&self) -> CompositorKind {
        CompositorKind::Stereo
    }

    fn begin_frame(&mut self, store: &mut dyn ConfigStore) {
        self.config = StereoConfig::snapshot(store);
        if store.take_flag(keys::PARAMS_CHANGED, keys::DEFAULT_PARAMS_CHANGED) {
            self.params_changed = true;
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.core.viewport = Extent::new(width, height);
    }

    fn set_target_geometry(&mut self, display: DisplayId, width: u32, height: u32) -> Result<()> {
        let state = self
            .displays
            .get_mut(display.index())
            .ok_or(CompositorError::UnknownDisplay(display))?;
        if state.record_geometry(Extent::new(width, height)) {
            log::debug!("{display:?} geometry {width}x{height}");
        }
        self.active = display;
        Ok(())
    }

    fn begin_group(&mut self, backend: &mut B, color_transform: ColorMatrix, mode: GroupMode) -> Result<()> {
        if !mode.is_stereo() {
            return self.core.begin_stack_group(backend, color_transform, mode);
        }
        self.prepare(backend)?;
        self.core.open(mode, color_transform);
        Ok(())
    }

    fn end_group(&mut self, backend: &mut B, mode: GroupMode) -> Result<()> {
        if !mode.is_stereo() {
            return self.core.end_stack_group(backend, mode);
        }
        let group = self.core.close(mode)?;
        let actual = self.core.stack.depth();
        if actual != group.depth {
            return Err(CompositorError::UnbalancedGroups { expected: group.depth, actual });
        }

        let capture = match mode {
            GroupMode::StereoWarpWithCapture => self.core.capture.take_pending(),
            _ => None,
        };
        let stack_target = self.core.stack.active_target();
        match capture {
            Some(target) => {
                log::debug!("warp pass redirected into capture {target:?}");
                let drawn = self.warp_pass(backend, Some(target), ColorMatrix::IDENTITY);
                backend.bind_target(stack_target);
                drawn
            }
            None => self.warp_pass(backend, stack_target, group.color_transform),
        }
    }

    fn request_capture(&mut self, target: TargetId) {
        self.core.capture.request(target);
    }

    fn cancel_capture(&mut self) {
        self.core.capture.cancel();
    }

    fn capture_pending(&self) -> bool {
        self.core.capture.is_pending()
    }

    fn depth(&self) -> usize {
        self.core.stack.depth()
    }

    fn eye_target(&self, eye: Eye) -> Option<TargetId> {
        self.displays[self.active.index()].eye_target(eye)
    }

    fn render_eye(&mut self, backend: &mut B, eye: Eye, draw: &mut EyeDraw<'_, B>) -> Result<bool> {
        let target = Compositor::<B>::eye_target(self, eye).ok_or(CompositorError::MissingEyeTargets)?;
        let previous = backend.bound_target();
        backend.bind_target(Some(target));
        let drawn = draw(backend, target);
        backend.bind_target(previous);
        drawn?;
        if eye == Eye::Right {
            self.right_eye_rendered = true;
        }
        Ok(true)
    }

    fn sample_content(
        &mut self,
        backend: &mut B,
        store: &mut dyn ConfigStore,
        mode: SampleMode,
    ) -> Result<SampleOutcome> {
        if mode == SampleMode::Reset {
            self.detector.reset();
            return Ok(SampleOutcome::Reset);
        }
        if !self.active.is_primary() {
            return Ok(SampleOutcome::Skipped);
        }
        let Some((left, right)) = self.displays[DisplayId::PRIMARY.index()].eye_targets() else {
            return Ok(SampleOutcome::Skipped);
        };
        let (a, b) = if self.config.content_is_3d {
            (SampleSource::whole(left), SampleSource::whole(right))
        } else {
            // Split content: both views live in the left buffer.
            (
                SampleSource::region(left, Rect::UNIT.top_half()),
                SampleSource::region(left, Rect::UNIT.bottom_half()),
            )
        };
        self.detector.sample_frame(backend, a, b, mode, store, &self.config)
    }

    fn release(&mut self, backend: &mut B) -> Result<()> {
        let unwound = self.core.unwind(backend);
        for display in &mut self.displays {
            display.release(backend);
        }
        self.detector.release(backend);
        self.eyes_allocated = false;
        unwound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Command, RecordingBackend};
    use crate::backend::MeshId;
    use crate::config::MemoryConfigStore;
    use crate::detect::PYRAMID_LEVELS;

    type Dyn = dyn Compositor<RecordingBackend>;

    struct Rig {
        b: RecordingBackend,
        c: StereoCompositor,
        store: MemoryConfigStore,
    }

    fn rig() -> Rig {
        let mut r = Rig { b: RecordingBackend::new(64, 64), c: StereoCompositor::new(), store: MemoryConfigStore::new() };
        r.frame(DisplayId::PRIMARY, 1920, 1080);
        r
    }

    impl Rig {
        fn c(&mut self) -> &mut Dyn {
            &mut self.c
        }

        fn frame(&mut self, display: DisplayId, w: u32, h: u32) {
            let store = &mut self.store;
            let c: &mut Dyn = &mut self.c;
            c.begin_frame(store);
            c.set_viewport(w, h);
            c.set_target_geometry(display, w, h).unwrap();
        }

        fn stereo(&mut self, mode: GroupMode) -> Result<()> {
            let (c, b): (&mut Dyn, _) = (&mut self.c, &mut self.b);
            c.begin_group(b, ColorMatrix::IDENTITY, mode)?;
            c.end_group(b, mode)
        }

        fn uploads(&self) -> usize {
            self.b.commands().iter().filter(|c| matches!(c, Command::UploadMesh { .. })).count()
        }

        fn warps(&self) -> Vec<(TargetId, Option<TargetId>, WarpParams)> {
            self.b
                .commands()
                .iter()
                .filter_map(|c| match c {
                    Command::Warp { source, target, params, .. } => Some((*source, *target, *params)),
                    _ => None,
                })
                .collect()
        }
    }

    fn noop(_: &mut RecordingBackend, _: TargetId) -> std::result::Result<(), BackendError> {
        Ok(())
    }

    // ── lazy allocation and mesh refresh ──────────────────────────────────

    #[test]
    fn first_stereo_group_allocates_eyes_pyramid_and_mesh() {
        let mut r = rig();
        r.stereo(GroupMode::StereoWarpGroup).unwrap();

        assert_eq!(r.b.live_targets(), DISPLAY_COUNT * 2 + PYRAMID_LEVELS * 2);
        // The external display has no size yet, so only the primary gets a mesh.
        assert_eq!(r.b.live_meshes(), 1);
        let primary = r.c.display(DisplayId::PRIMARY).unwrap();
        assert_eq!(primary.eye_size, Extent::new(960, 540));
        assert!(!primary.recompute);
        assert_eq!(r.store.get(keys::PARAMS_CHANGED), Some("0"));
    }

    #[test]
    fn failed_eye_allocation_frees_partial_buffers() {
        // Fail each of the four eye-buffer allocations in turn.
        for successes in 0..DISPLAY_COUNT * 2 {
            let mut r = rig();
            r.b.fail_allocation_after(successes);
            assert!(matches!(r.stereo(GroupMode::StereoWarpGroup), Err(CompositorError::Backend(_))));
            assert_eq!(r.b.live_targets(), 0, "after failing allocation {successes}");
            assert_eq!(Compositor::<RecordingBackend>::eye_target(&r.c, Eye::Left), None);

            r.stereo(GroupMode::StereoWarpGroup).unwrap();
            assert_eq!(r.b.live_targets(), DISPLAY_COUNT * 2 + PYRAMID_LEVELS * 2);
            let (c, b): (&mut Dyn, _) = (&mut r.c, &mut r.b);
            c.release(b).unwrap();
            assert_eq!(r.b.live_targets(), 0);
        }
    }

    #[test]
    fn unchanged_frames_do_not_rebuild_meshes() {
        let mut r = rig();
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        r.b.take_commands();
        for _ in 0..3 {
            r.frame(DisplayId::PRIMARY, 1920, 1080);
            r.stereo(GroupMode::StereoWarpGroup).unwrap();
        }
        assert_eq!(r.uploads(), 0);
    }

    #[test]
    fn geometry_change_rebuilds_only_that_display() {
        let mut r = rig();
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        r.frame(DisplayId::EXTERNAL, 1280, 720);
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        r.b.take_commands();

        r.frame(DisplayId::PRIMARY, 1280, 800);
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        assert_eq!(r.uploads(), 1);
        assert!(r.b.commands().iter().any(|c| matches!(c, Command::ReleaseMesh(_))));
        assert_eq!(r.b.live_meshes(), 2);
    }

    #[test]
    fn params_changed_rebuilds_every_sized_display() {
        let mut r = rig();
        r.frame(DisplayId::EXTERNAL, 1280, 720);
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        r.b.take_commands();

        r.store.set_bool(keys::PARAMS_CHANGED, true);
        r.frame(DisplayId::EXTERNAL, 1280, 720);
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        assert_eq!(r.uploads(), DISPLAY_COUNT);
        assert!(!r.store.get_bool(keys::PARAMS_CHANGED, true));
        assert_eq!(r.b.live_meshes(), DISPLAY_COUNT);
    }

    #[test]
    fn eye_buffers_follow_height_scale() {
        let mut r = rig();
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        r.store.set(keys::HEIGHT_SCALE, "0.6");
        r.frame(DisplayId::PRIMARY, 1920, 1080);
        r.stereo(GroupMode::StereoWarpGroup).unwrap();

        let primary = r.c.display(DisplayId::PRIMARY).unwrap();
        assert_eq!(primary.eye_size, Extent::new(1152, 540));
        assert_eq!(r.b.target_size(primary.left.unwrap()), Some((1152, 540)));
    }

    // ── warp pass ─────────────────────────────────────────────────────────

    #[test]
    fn primary_warp_uses_lens_effects_and_reuses_left_for_mono() {
        let mut r = rig();
        r.store.set_bool(keys::DISPERSION, true);
        r.frame(DisplayId::PRIMARY, 1920, 1080);
        r.stereo(GroupMode::StereoWarpGroup).unwrap();

        let left = r.c.display(DisplayId::PRIMARY).unwrap().left.unwrap();
        let warps = r.warps();
        assert_eq!(warps.len(), 2);
        assert_eq!(warps[0].0, left);
        assert_eq!(warps[1].0, left);
        assert_eq!(warps[0].1, None);
        assert_eq!(warps[1].2.eye, Eye::Right);
        assert!(warps[0].2.distortion && warps[0].2.fog_border && warps[0].2.dispersion);
    }

    #[test]
    fn right_eye_content_feeds_right_pass_once() {
        let mut r = rig();
        {
            let (c, b): (&mut Dyn, _) = (&mut r.c, &mut r.b);
            c.begin_group(b, ColorMatrix::IDENTITY, GroupMode::StereoWarpGroup).unwrap();
            assert!(c.render_eye(b, Eye::Right, &mut noop).unwrap());
            assert_eq!(b.bound_target(), None);
            c.end_group(b, GroupMode::StereoWarpGroup).unwrap();
        }
        let right = r.c.display(DisplayId::PRIMARY).unwrap().right.unwrap();
        assert_eq!(r.warps()[1].0, right);

        r.b.take_commands();
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        assert_ne!(r.warps()[1].0, right);
    }

    #[test]
    fn external_display_warps_without_lens_effects() {
        let mut r = rig();
        r.store.set_bool(keys::DISPERSION, true);
        r.frame(DisplayId::EXTERNAL, 1280, 720);
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        for (_, _, p) in r.warps() {
            assert!(!p.distortion && !p.fog_border && !p.dispersion);
        }
    }

    #[test]
    fn warp_lands_on_enclosing_group() {
        let mut r = rig();
        let (c, b): (&mut Dyn, _) = (&mut r.c, &mut r.b);
        c.begin_group(b, ColorMatrix::IDENTITY, GroupMode::NestedGroup).unwrap();
        let group = b.bound_target();
        c.begin_group(b, ColorMatrix::IDENTITY, GroupMode::StereoWarpGroup).unwrap();
        c.end_group(b, GroupMode::StereoWarpGroup).unwrap();
        assert_eq!(r.warps()[0].1, group);
    }

    // ── capture ───────────────────────────────────────────────────────────

    #[test]
    fn warp_with_capture_redirects_then_restores() {
        let mut r = rig();
        let capture = r.b.create_target(&TargetDesc::new("capture", 1920, 1080, Filter::Nearest)).unwrap();
        r.c().request_capture(capture);
        r.stereo(GroupMode::StereoWarpWithCapture).unwrap();

        assert!(r.warps().iter().all(|(_, target, _)| *target == Some(capture)));
        assert_eq!(r.b.bound_target(), None);
        assert!(!r.c().capture_pending());

        r.b.take_commands();
        r.stereo(GroupMode::StereoWarpWithCapture).unwrap();
        assert!(r.warps().iter().all(|(_, target, _)| target.is_none()));
    }

    #[test]
    fn plain_warp_ignores_capture_request() {
        let mut r = rig();
        r.c().request_capture(TargetId(999));
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        assert!(r.warps().iter().all(|(_, target, _)| target.is_none()));
        assert!(r.c().capture_pending());
    }

    #[test]
    fn clear_covers_eyes_and_capture() {
        let mut r = rig();
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        let capture = r.b.create_target(&TargetDesc::new("capture", 4, 4, Filter::Nearest)).unwrap();
        r.c().request_capture(capture);
        r.b.take_commands();

        r.c.clear_eye_targets(&mut r.b);
        let cleared = r.b.commands().iter().filter(|c| matches!(c, Command::Clear { .. })).count();
        assert_eq!(cleared, 3);
        assert_eq!(r.b.bound_target(), None);
    }

    // ── contract violations ───────────────────────────────────────────────

    #[test]
    fn stereo_end_over_open_group_is_unbalanced() {
        let mut r = rig();
        let (c, b): (&mut Dyn, _) = (&mut r.c, &mut r.b);
        c.begin_group(b, ColorMatrix::IDENTITY, GroupMode::StereoWarpGroup).unwrap();
        c.begin_group(b, ColorMatrix::IDENTITY, GroupMode::NestedGroup).unwrap();
        assert!(matches!(
            c.end_group(b, GroupMode::StereoWarpGroup),
            Err(CompositorError::UnbalancedGroups { expected: 0, actual: 1 })
        ));
    }

    #[test]
    fn eye_access_before_allocation_fails() {
        let mut r = rig();
        let (c, b): (&mut Dyn, _) = (&mut r.c, &mut r.b);
        assert!(matches!(
            c.render_eye(b, Eye::Left, &mut noop),
            Err(CompositorError::MissingEyeTargets)
        ));
    }

    #[test]
    fn unknown_display_is_rejected() {
        let mut r = rig();
        assert!(matches!(
            r.c().set_target_geometry(DisplayId(5), 1, 1),
            Err(CompositorError::UnknownDisplay(DisplayId(5)))
        ));
    }

    // ── detection ─────────────────────────────────────────────────────────

    #[test]
    fn split_content_samples_halves_of_left_buffer() {
        let mut r = rig();
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        r.b.take_commands();
        let (c, b, store): (&mut Dyn, _, _) = (&mut r.c, &mut r.b, &mut r.store);
        let outcome = c.sample_content(b, store, SampleMode::Sample).unwrap();
        // Freshly allocated buffers are uniform black.
        assert_eq!(outcome, SampleOutcome::Discarded);

        let left = r.c.display(DisplayId::PRIMARY).unwrap().left.unwrap();
        let level0_sources: Vec<_> = r
            .b
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Quad { source, .. } if *source == left => Some(*source),
                _ => None,
            })
            .collect();
        assert_eq!(level0_sources.len(), 2);
    }

    #[test]
    fn detection_skips_external_display() {
        let mut r = rig();
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        r.frame(DisplayId::EXTERNAL, 1280, 720);
        let (c, b, store): (&mut Dyn, _, _) = (&mut r.c, &mut r.b, &mut r.store);
        assert_eq!(c.sample_content(b, store, SampleMode::Sample).unwrap(), SampleOutcome::Skipped);
        assert_eq!(c.sample_content(b, store, SampleMode::Reset).unwrap(), SampleOutcome::Reset);
    }

    #[test]
    fn release_frees_everything() {
        let mut r = rig();
        r.frame(DisplayId::EXTERNAL, 1280, 720);
        r.stereo(GroupMode::StereoWarpGroup).unwrap();
        let (c, b): (&mut Dyn, _) = (&mut r.c, &mut r.b);
        c.begin_group(b, ColorMatrix::IDENTITY, GroupMode::NestedGroup).unwrap();
        c.release(b).unwrap();
        assert_eq!(r.b.live_targets(), 0);
        assert_eq!(r.b.live_meshes(), 0);
        assert_eq!(r.c.display(DisplayId::PRIMARY).unwrap().mesh, None::<MeshId>);
    }
}
