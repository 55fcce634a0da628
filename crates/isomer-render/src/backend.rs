//! The seam between the batch engine and the GPU.

use glam::Vec3;

use crate::effect::Technique;
use crate::state::{RenderState, Viewport};
use crate::texture::Texture2D;
use crate::vertex::SpriteVertex;

/// Device-facing operations the batcher needs, and nothing more: apply the
/// pending render state, upload one contiguous vertex range, and issue one
/// indexed draw call per texture run.
pub trait GraphicsBackend {
    /// Bind the render state, technique, and viewport-derived projection.
    ///
    /// Called at the top of every flush, including empty ones (state changes
    /// alone must still become visible). Re-applying identical state is cheap;
    /// correctness never depends on skipping it.
    fn apply_state(&mut self, state: &RenderState, viewport: Viewport, technique: Technique);

    /// Upload a staged vertex range in one transfer.
    ///
    /// Returns the base vertex of the uploaded range within the bound vertex
    /// buffer, or `None` when the backend cannot accept the range this frame
    /// (the batcher then drops the staged quads and keeps going).
    fn upload_vertices(&mut self, vertices: &[SpriteVertex]) -> Option<u32>;

    /// Draw `quad_count` quads starting at `base_vertex`, with `texture`
    /// bound, as an indexed triangle list over the static index pattern.
    fn draw_quads(&mut self, texture: &Texture2D, base_vertex: u32, quad_count: u32);

    /// Current render target extent in pixels.
    fn viewport(&self) -> Viewport;

    fn set_light_direction(&mut self, direction: Vec3);

    fn set_light_intensity(&mut self, intensity: f32);

    fn enable_light(&mut self, enabled: bool);
}

/// One draw call captured by the [`RecordingBackend`], together with the
/// state that was in effect when it was issued.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone)]
pub struct RecordedDraw {
    pub texture_id: u64,
    pub base_vertex: u32,
    pub quad_count: u32,
    pub state: RenderState,
    pub technique: Technique,
}

/// Backend that records every applied state, upload, and draw call instead of
/// touching a GPU. Drives the flush-semantics tests.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
pub struct RecordingBackend {
    viewport: Viewport,
    vertex_cursor: u32,
    current: Option<(RenderState, Technique)>,
    pub applied_states: Vec<(RenderState, Technique)>,
    pub uploads: Vec<usize>,
    pub draws: Vec<RecordedDraw>,
    pub light_directions: Vec<Vec3>,
    pub light_intensities: Vec<f32>,
    pub light_toggles: Vec<bool>,
}

#[cfg(any(test, feature = "mock"))]
impl RecordingBackend {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            vertex_cursor: 0,
            current: None,
            applied_states: Vec::new(),
            uploads: Vec::new(),
            draws: Vec::new(),
            light_directions: Vec::new(),
            light_intensities: Vec::new(),
            light_toggles: Vec::new(),
        }
    }

    /// Number of flushes observed (every flush applies state exactly once).
    pub fn flush_count(&self) -> usize {
        self.applied_states.len()
    }

    /// Run lengths of the recorded draw calls, in issue order.
    pub fn run_lengths(&self) -> Vec<u32> {
        self.draws.iter().map(|d| d.quad_count).collect()
    }
}

#[cfg(any(test, feature = "mock"))]
impl GraphicsBackend for RecordingBackend {
    fn apply_state(&mut self, state: &RenderState, _viewport: Viewport, technique: Technique) {
        self.current = Some((*state, technique));
        self.applied_states.push((*state, technique));
    }

    fn upload_vertices(&mut self, vertices: &[SpriteVertex]) -> Option<u32> {
        self.uploads.push(vertices.len());
        let base = self.vertex_cursor;
        self.vertex_cursor += vertices.len() as u32;
        Some(base)
    }

    fn draw_quads(&mut self, texture: &Texture2D, base_vertex: u32, quad_count: u32) {
        let (state, technique) = self
            .current
            .expect("draw_quads() before any apply_state()");
        self.draws.push(RecordedDraw {
            texture_id: texture.id(),
            base_vertex,
            quad_count,
            state,
            technique,
        });
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_light_direction(&mut self, direction: Vec3) {
        self.light_directions.push(direction);
    }

    fn set_light_intensity(&mut self, intensity: f32) {
        self.light_intensities.push(intensity);
    }

    fn enable_light(&mut self, enabled: bool) {
        self.light_toggles.push(enabled);
    }
}
