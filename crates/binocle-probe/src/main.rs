//! Headless run of the stereo compositor on a real GPU.
//!
//! Usage: `binocle-probe [overrides-file]`. The optional file holds
//! `key=value` config lines (see `binocle_engine::config::keys`).

use anyhow::Context;

use binocle_engine::backend::{BlitQuad, BlitState, Filter, RenderBackend, TargetDesc, TargetId};
use binocle_engine::config::{keys, ConfigStore, MemoryConfigStore};
use binocle_engine::coords::{ColorMatrix, Rect};
use binocle_engine::detect::{SampleMode, SampleOutcome};
use binocle_engine::device::{Gpu, GpuInit};
use binocle_engine::logging::{init_logging, LoggingConfig};
use binocle_engine::render::WgpuBackend;
use binocle_engine::warp::Eye;
use binocle_engine::{create_compositor, BackendError, CompositorKind, DisplayId, GroupMode};

const WIDTH: u32 = 1920;
const HEIGHT: u32 = 1080;
const FRAMES: u32 = 24;

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let mut store = MemoryConfigStore::new();
    if let Some(path) = std::env::args().nth(1) {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config overrides from {path}"))?;
        store.parse_overrides(&text);
    }
    // Sample every frame unless told otherwise.
    if store.get(keys::DETECT_RATE).is_none() {
        store.set(keys::DETECT_RATE, "1");
    }

    let gpu = Gpu::new_blocking(GpuInit::default()).context("creating wgpu device")?;
    let mut backend = WgpuBackend::new(&gpu, WIDTH, HEIGHT);
    let mut compositor = create_compositor::<WgpuBackend>(CompositorKind::Stereo);

    let block = backend.create_target(&TargetDesc::new("probe block", 64, 64, Filter::Nearest))?;
    backend.bind_target(Some(block));
    backend.clear([1.0, 1.0, 1.0, 1.0]);
    backend.bind_target(None);

    for frame in 0..FRAMES {
        compositor.begin_frame(&mut store);
        compositor.set_viewport(WIDTH, HEIGHT);
        compositor.set_target_geometry(DisplayId::PRIMARY, WIDTH, HEIGHT)?;

        compositor.begin_group(&mut backend, ColorMatrix::IDENTITY, GroupMode::StereoWarpGroup)?;
        let phase = frame as f32 / FRAMES as f32;
        for eye in [Eye::Left, Eye::Right] {
            let mut draw = |b: &mut WgpuBackend, target: TargetId| -> Result<(), BackendError> {
                draw_block(b, target, block, phase)
            };
            compositor.render_eye(&mut backend, eye, &mut draw)?;
        }
        compositor.end_group(&mut backend, GroupMode::StereoWarpGroup)?;

        match compositor.sample_content(&mut backend, &mut store, SampleMode::Sample)? {
            SampleOutcome::Decided { average, is_3d } => {
                log::info!("frame {frame}: decided 3d={is_3d} (average {average:.3})")
            }
            outcome => log::debug!("frame {frame}: {outcome:?}"),
        }
    }

    let mut pixels = Vec::new();
    let (w, h) = backend.read_back_buffer(&mut pixels)?;
    let lit = pixels.chunks_exact(4).filter(|px| px[0] > 0).count();
    log::info!(
        "{}: back buffer {w}x{h}, {lit} lit pixels, content_is_3d={}",
        gpu.adapter_info().name,
        store.get_bool(keys::CONTENT_IS_3D, keys::DEFAULT_CONTENT_IS_3D)
    );

    compositor.release(&mut backend)?;
    backend.release_target(block);
    Ok(())
}

/// Black eye buffer with a white block sweeping left to right.
fn draw_block(b: &mut WgpuBackend, target: TargetId, block: TargetId, phase: f32) -> Result<(), BackendError> {
    b.clear([0.0, 0.0, 0.0, 1.0]);
    let (w, h) = b.target_size(target).unwrap_or((1, 1));
    let (w, h) = (w as f32, h as f32);
    let quad = BlitQuad {
        dst: Rect::new(phase * w * 0.75, h * 0.25, w * 0.25, h * 0.5),
        src_uv: Rect::UNIT,
    };
    b.draw_quad(block, &quad, &BlitState::default())
}
