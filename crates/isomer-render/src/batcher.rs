//! The batch engine: staging, culling, run coalescing, and flush.
//!
//! One `Batcher2D` owns the staging buffer and render state tracker and runs
//! strictly synchronously on the thread that owns the GPU context. Quads are
//! drawn in submission order; flushing merges only already-adjacent
//! same-texture quads into runs and never sorts.

use glam::{Mat4, Vec2, Vec3};
use isomer_core::geometry::{Pos, Rect};

use crate::backend::GraphicsBackend;
use crate::effect::Technique;
use crate::index::MAX_QUADS;
use crate::shadow::skew_shadow;
use crate::state::{BlendMode, RenderState, StencilMode};
use crate::texture::Texture2D;
use crate::vertex::{self, Quad, SpriteVertex, UvRect};

use bytemuck::Zeroable;

/// Visibility volume spanning the viewport in x/y and unbounded in z.
#[derive(Debug, Clone, Copy)]
struct DrawingBounds {
    min: Vec3,
    max: Vec3,
}

impl DrawingBounds {
    fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// Turns an ordered stream of quad draw requests into the minimum number of
/// indexed GPU draw calls.
///
/// All drawing happens inside a [`begin`](Self::begin)/[`end`](Self::end)
/// session; sessions never nest. Session misuse is a programming error,
/// checked in debug builds only.
pub struct Batcher2D<B: GraphicsBackend> {
    backend: B,
    /// Staged vertices; `[4*i .. 4*i+3]` belongs to quad `i` for
    /// `i < quad_count`. Memory past the cursor is stale.
    vertices: Box<[SpriteVertex]>,
    /// Texture handle of each staged quad, parallel to `vertices`.
    textures: Vec<Texture2D>,
    quad_count: usize,
    started: bool,
    bounds: DrawingBounds,
    state: RenderState,
    technique: Technique,
}

impl<B: GraphicsBackend> Batcher2D<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            vertices: vec![SpriteVertex::zeroed(); MAX_QUADS * 4].into_boxed_slice(),
            textures: Vec::with_capacity(MAX_QUADS),
            quad_count: 0,
            started: false,
            bounds: DrawingBounds {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            },
            state: RenderState::default(),
            technique: Technique::default(),
        }
    }

    /// Opens a batch session and resets the drawing bounds to the current
    /// viewport extent.
    pub fn begin(&mut self) {
        debug_assert!(!self.started, "begin() called while a session is open");
        self.started = true;

        let viewport = self.backend.viewport();
        self.bounds = DrawingBounds {
            min: Vec3::new(0.0, 0.0, f32::MIN),
            max: Vec3::new(viewport.width as f32, viewport.height as f32, f32::MAX),
        };
    }

    /// Closes the session, flushing whatever is still staged.
    pub fn end(&mut self) {
        debug_assert!(self.started, "end() called without an open session");
        self.flush();
        self.started = false;
    }

    /// Stages one quad for `texture`.
    ///
    /// Returns `false` without staging when the texture is invalid or when no
    /// vertex of the quad lies inside the drawing bounds. Staging is a pure
    /// CPU append and never fails on GPU state; a full staging buffer is
    /// flushed before appending.
    pub fn draw_sprite(&mut self, texture: &Texture2D, quad: &Quad, technique: Technique) -> bool {
        debug_assert!(self.started, "draw_sprite() outside a session");

        if !texture.is_valid() {
            return false;
        }

        if !quad.iter().any(|v| self.bounds.contains(v.position)) {
            return false;
        }

        self.stage(texture, quad, technique);
        true
    }

    /// Stages a flattened shadow of `quad`, anchored at `anchor` and placed
    /// at `depth` in the world layer.
    ///
    /// Shadows skip the visibility test: a sprite scrolled just off-screen
    /// still casts into view. The quad is skewed in place before staging.
    pub fn draw_shadow(
        &mut self,
        texture: &Texture2D,
        quad: &mut Quad,
        anchor: Vec2,
        flipped: bool,
        depth: f32,
    ) {
        debug_assert!(self.started, "draw_shadow() outside a session");

        if !texture.is_valid() {
            return;
        }

        skew_shadow(quad, anchor, flipped);
        for vertex in quad.iter_mut() {
            vertex.position.z = depth;
        }
        self.stage(texture, quad, Technique::Shadow);
    }

    fn stage(&mut self, texture: &Texture2D, quad: &Quad, technique: Technique) {
        // The technique is part of the render state: switching it mid-batch
        // draws the staged quads under the old one first.
        if technique != self.technique {
            self.flush();
            self.technique = technique;
        }

        if self.quad_count == MAX_QUADS {
            self.flush();
        }

        let base = self.quad_count * 4;
        self.vertices[base..base + 4].copy_from_slice(quad);
        self.textures.push(texture.clone());
        self.quad_count += 1;
    }

    /// Applies pending render state and turns the staged quads into one
    /// indexed draw call per maximal run of consecutive same-texture quads.
    ///
    /// The draw-call count equals the number of texture switches in
    /// submission order; non-adjacent runs of the same texture are never
    /// merged. With nothing staged, the state is still applied but no draw
    /// call is issued.
    pub fn flush(&mut self) {
        let viewport = self.backend.viewport();
        self.backend.apply_state(&self.state, viewport, self.technique);

        if self.quad_count == 0 {
            return;
        }

        let staged = &self.vertices[..self.quad_count * 4];
        let Some(base_vertex) = self.backend.upload_vertices(staged) else {
            // Upload refused (backend out of frame capacity); drop the staged
            // quads so the rest of the frame can proceed.
            self.quad_count = 0;
            self.textures.clear();
            return;
        };

        let mut run_start = 0;
        for i in 1..self.quad_count {
            if self.textures[i] != self.textures[run_start] {
                self.backend.draw_quads(
                    &self.textures[run_start],
                    base_vertex + (run_start * 4) as u32,
                    (i - run_start) as u32,
                );
                run_start = i;
            }
        }
        self.backend.draw_quads(
            &self.textures[run_start],
            base_vertex + (run_start * 4) as u32,
            (self.quad_count - run_start) as u32,
        );

        self.quad_count = 0;
        self.textures.clear();
    }

    /// Switches the blend mode. Staged quads are flushed first so they draw
    /// under the old mode, unless `defer_flush` batches this change with a
    /// following one.
    pub fn set_blend_mode(&mut self, blend: BlendMode, defer_flush: bool) {
        if !defer_flush {
            self.flush();
        }
        self.state.blend = blend;
    }

    /// Switches the depth/stencil mode, flushing first unless deferred.
    pub fn set_stencil_mode(&mut self, stencil: StencilMode, defer_flush: bool) {
        if !defer_flush {
            self.flush();
        }
        self.state.stencil = stencil;
    }

    /// Toggles the scissor test. A no-op when the value is unchanged, so
    /// repeated toggles cost no extra flushes.
    pub fn enable_scissor(&mut self, enabled: bool) {
        if enabled == self.state.scissor {
            return;
        }
        self.flush();
        self.state.scissor = enabled;
    }

    /// Sets the scissor rectangle in target pixels (`None` = full viewport).
    pub fn set_scissor_rect(&mut self, rect: Option<Rect<u32>>) {
        if rect == self.state.scissor_rect {
            return;
        }
        self.flush();
        self.state.scissor_rect = rect;
    }

    /// Replaces the world transform, flushing the staged quads first.
    pub fn set_transform(&mut self, transform: Mat4) {
        if transform == self.state.transform {
            return;
        }
        self.flush();
        self.state.transform = transform;
    }

    pub fn transform(&self) -> Mat4 {
        self.state.transform
    }

    pub fn set_light_direction(&mut self, direction: Vec3) {
        self.backend.set_light_direction(direction);
    }

    pub fn set_light_intensity(&mut self, intensity: f32) {
        self.backend.set_light_intensity(intensity);
    }

    pub fn enable_light(&mut self, enabled: bool) {
        self.backend.enable_light(enabled);
    }

    /// Draws the full texture at `position`.
    pub fn draw_2d(&mut self, texture: &Texture2D, position: Pos<i32>, hue: Vec3) -> bool {
        if !texture.is_valid() {
            return false;
        }
        let quad = vertex::make_quad(
            position.x as f32,
            position.y as f32,
            texture.width() as f32,
            texture.height() as f32,
            UvRect::FULL,
            hue,
        );
        self.draw_sprite(texture, &quad, Technique::Hued)
    }

    /// Draws `source` (texture pixels) at `position` at 1:1 scale.
    pub fn draw_2d_from(
        &mut self,
        texture: &Texture2D,
        position: Pos<i32>,
        source: Rect<i32>,
        hue: Vec3,
    ) -> bool {
        if !texture.is_valid() {
            return false;
        }
        let uv = UvRect::from_source(source, texture.width(), texture.height());
        let quad = vertex::make_quad(
            position.x as f32,
            position.y as f32,
            source.width as f32,
            source.height as f32,
            uv,
            hue,
        );
        self.draw_sprite(texture, &quad, Technique::Hued)
    }

    /// Stretches `source` (texture pixels) into `dest`.
    pub fn draw_2d_stretched(
        &mut self,
        texture: &Texture2D,
        dest: Rect<i32>,
        source: Rect<i32>,
        hue: Vec3,
    ) -> bool {
        if !texture.is_valid() {
            return false;
        }
        let uv = UvRect::from_source(source, texture.width(), texture.height());
        let quad = vertex::make_quad(
            dest.x as f32,
            dest.y as f32,
            dest.width as f32,
            dest.height as f32,
            uv,
            hue,
        );
        self.draw_sprite(texture, &quad, Technique::Hued)
    }

    /// Stretches the full texture into `dest`.
    pub fn draw_2d_fill(&mut self, texture: &Texture2D, dest: Rect<i32>, hue: Vec3) -> bool {
        if !texture.is_valid() {
            return false;
        }
        let quad = vertex::make_quad(
            dest.x as f32,
            dest.y as f32,
            dest.width as f32,
            dest.height as f32,
            UvRect::FULL,
            hue,
        );
        self.draw_sprite(texture, &quad, Technique::Hued)
    }

    /// Tiles the texture across `dest` at 1:1 scale, clamping the tail tile
    /// on each axis to the remaining extent. Exact divisions produce exactly
    /// `dest.width / tex.width` x `dest.height / tex.height` tiles.
    pub fn draw_2d_tiled(&mut self, texture: &Texture2D, dest: Rect<i32>, hue: Vec3) -> bool {
        if !texture.is_valid() {
            return false;
        }
        let tex_w = texture.width() as i32;
        let tex_h = texture.height() as i32;

        let mut y = dest.y;
        let mut remaining_h = dest.height;
        while remaining_h > 0 {
            let tile_h = remaining_h.min(tex_h);
            let mut x = dest.x;
            let mut remaining_w = dest.width;
            while remaining_w > 0 {
                let tile_w = remaining_w.min(tex_w);
                self.draw_2d_from(
                    texture,
                    Pos::new(x, y),
                    Rect::new(0, 0, tile_w, tile_h),
                    hue,
                );
                remaining_w -= tex_w;
                x += tex_w;
            }
            remaining_h -= tex_h;
            y += tex_h;
        }

        true
    }

    /// Draws a one-pixel rectangle outline from four thin fills.
    pub fn draw_rectangle(&mut self, texture: &Texture2D, rect: Rect<i32>, hue: Vec3) -> bool {
        self.draw_2d_fill(texture, Rect::new(rect.x, rect.y, rect.width, 1), hue);
        self.draw_2d_fill(texture, Rect::new(rect.right(), rect.y, 1, rect.height), hue);
        self.draw_2d_fill(texture, Rect::new(rect.x, rect.bottom(), rect.width, 1), hue);
        self.draw_2d_fill(texture, Rect::new(rect.x, rect.y, 1, rect.height), hue);
        true
    }

    /// Number of quads currently staged and not yet flushed.
    pub fn quad_count(&self) -> usize {
        self.quad_count
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::state::Viewport;

    fn batcher() -> Batcher2D<RecordingBackend> {
        let mut batcher = Batcher2D::new(RecordingBackend::new(Viewport::new(800, 600)));
        batcher.begin();
        batcher
    }

    fn unit_quad(x: f32, y: f32) -> Quad {
        vertex::make_quad(x, y, 10.0, 10.0, UvRect::FULL, Vec3::ZERO)
    }

    #[test]
    fn test_run_partitioning_preserves_order() {
        let mut batcher = batcher();
        let a = Texture2D::mock(16, 16);
        let b = Texture2D::mock(16, 16);

        // A A B B B A must produce runs [2, 3, 1], never merging the A runs.
        for texture in [&a, &a, &b, &b, &b, &a] {
            assert!(batcher.draw_sprite(texture, &unit_quad(0.0, 0.0), Technique::Hued));
        }
        batcher.flush();

        let backend = batcher.into_backend();
        assert_eq!(backend.run_lengths(), vec![2, 3, 1]);
        assert_eq!(backend.draws[0].texture_id, a.id());
        assert_eq!(backend.draws[1].texture_id, b.id());
        assert_eq!(backend.draws[2].texture_id, a.id());
        // Base vertices follow the staging layout: 4 vertices per quad.
        assert_eq!(backend.draws[0].base_vertex, 0);
        assert_eq!(backend.draws[1].base_vertex, 8);
        assert_eq!(backend.draws[2].base_vertex, 20);
        // One transfer for the whole staged range.
        assert_eq!(backend.uploads, vec![24]);
    }

    #[test]
    fn test_single_texture_is_one_draw() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(16, 16);

        for _ in 0..100 {
            batcher.draw_sprite(&texture, &unit_quad(0.0, 0.0), Technique::Hued);
        }
        batcher.end();

        assert_eq!(batcher.backend().run_lengths(), vec![100]);
    }

    #[test]
    fn test_capacity_triggers_one_implicit_flush() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(16, 16);
        let quad = unit_quad(0.0, 0.0);

        for _ in 0..MAX_QUADS {
            batcher.draw_sprite(&texture, &quad, Technique::Hued);
        }
        assert_eq!(batcher.quad_count(), MAX_QUADS);
        assert_eq!(batcher.backend().flush_count(), 0);

        // The quad that would overflow flushes first, then stages.
        batcher.draw_sprite(&texture, &quad, Technique::Hued);
        assert_eq!(batcher.quad_count(), 1);
        assert_eq!(batcher.backend().flush_count(), 1);
        assert_eq!(batcher.backend().run_lengths(), vec![MAX_QUADS as u32]);
    }

    #[test]
    fn test_scissor_toggle_is_idempotent() {
        let mut batcher = batcher();

        batcher.enable_scissor(true);
        let flushes = batcher.backend().flush_count();
        batcher.enable_scissor(true);
        assert_eq!(batcher.backend().flush_count(), flushes);
        assert!(batcher.state().scissor);

        batcher.enable_scissor(false);
        assert_eq!(batcher.backend().flush_count(), flushes + 1);
    }

    #[test]
    fn test_state_change_draws_staged_quads_under_old_state() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(16, 16);

        batcher.draw_sprite(&texture, &unit_quad(0.0, 0.0), Technique::Hued);
        batcher.set_blend_mode(BlendMode::Additive, false);

        let draw = &batcher.backend().draws[0];
        assert_eq!(draw.state.blend, BlendMode::Alpha);
        assert_eq!(batcher.state().blend, BlendMode::Additive);
    }

    #[test]
    fn test_deferred_state_change_skips_flush() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(16, 16);

        batcher.draw_sprite(&texture, &unit_quad(0.0, 0.0), Technique::Hued);
        batcher.set_blend_mode(BlendMode::Additive, true);
        batcher.set_stencil_mode(StencilMode::MarkStencil, true);
        assert_eq!(batcher.backend().flush_count(), 0);

        // The deferred changes take effect for the quads staged before them.
        batcher.flush();
        let draw = &batcher.backend().draws[0];
        assert_eq!(draw.state.blend, BlendMode::Additive);
        assert_eq!(draw.state.stencil, StencilMode::MarkStencil);
    }

    #[test]
    fn test_empty_flush_still_applies_state() {
        let mut batcher = batcher();
        batcher.flush();

        let backend = batcher.backend();
        assert_eq!(backend.flush_count(), 1);
        assert!(backend.draws.is_empty());
        assert!(backend.uploads.is_empty());
    }

    #[test]
    fn test_culling_rejects_offscreen_quads() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(16, 16);

        // Entirely right of the 800x600 viewport.
        assert!(!batcher.draw_sprite(&texture, &unit_quad(1000.0, 0.0), Technique::Hued));
        assert_eq!(batcher.quad_count(), 0);

        // One vertex inside is enough.
        assert!(batcher.draw_sprite(&texture, &unit_quad(795.0, 0.0), Technique::Hued));
        assert_eq!(batcher.quad_count(), 1);
    }

    #[test]
    fn test_invalid_texture_rejected() {
        let mut batcher = batcher();
        let disposed = Texture2D::mock_disposed();

        assert!(!batcher.draw_sprite(&disposed, &unit_quad(0.0, 0.0), Technique::Hued));
        assert!(!batcher.draw_2d(&disposed, Pos::new(0, 0), Vec3::ZERO));
        assert_eq!(batcher.quad_count(), 0);
    }

    #[test]
    fn test_shadow_skips_culling() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(16, 16);

        let mut quad = unit_quad(5000.0, 5000.0);
        batcher.draw_shadow(&texture, &mut quad, Vec2::new(5000.0, 5020.0), false, 0.25);
        assert_eq!(batcher.quad_count(), 1);
        assert!(quad.iter().all(|v| v.position.z == 0.25));
    }

    #[test]
    fn test_technique_switch_flushes() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(16, 16);

        batcher.draw_sprite(&texture, &unit_quad(0.0, 0.0), Technique::Hued);
        batcher.draw_sprite(&texture, &unit_quad(0.0, 0.0), Technique::Land);
        batcher.end();

        let backend = batcher.backend();
        assert_eq!(backend.draws.len(), 2);
        assert_eq!(backend.draws[0].technique, Technique::Hued);
        assert_eq!(backend.draws[1].technique, Technique::Land);
    }

    #[test]
    fn test_tiled_fill_partial_column() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(100, 40);

        // 2.5 texture widths by 1 texture height: two full tiles + one partial.
        batcher.draw_2d_tiled(&texture, Rect::new(0, 0, 250, 40), Vec3::ZERO);
        assert_eq!(batcher.quad_count(), 3);

        // The partial tile keeps 1:1 scale: its source is clamped to 50px.
        batcher.flush();
        let backend = batcher.backend();
        assert_eq!(backend.uploads, vec![12]);
    }

    #[test]
    fn test_tiled_fill_exact_division() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(100, 40);

        // Exact division on both axes: no fractional or overdraw tile.
        batcher.draw_2d_tiled(&texture, Rect::new(0, 0, 200, 80), Vec3::ZERO);
        assert_eq!(batcher.quad_count(), 4);
    }

    #[test]
    fn test_tiled_fill_row_reset_after_clamp() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(100, 40);

        // 1.5 x 1.5 textures: the width clamp in row 1 must not leak into
        // row 2's first (full-width) tile.
        batcher.draw_2d_tiled(&texture, Rect::new(0, 0, 150, 60), Vec3::ZERO);
        assert_eq!(batcher.quad_count(), 4);
    }

    #[test]
    fn test_rectangle_outline_stages_four_quads() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(4, 4);

        batcher.draw_rectangle(&texture, Rect::new(10, 10, 50, 30), Vec3::ZERO);
        assert_eq!(batcher.quad_count(), 4);
    }

    #[test]
    fn test_end_flushes_remaining_quads() {
        let mut batcher = batcher();
        let texture = Texture2D::mock(16, 16);

        batcher.draw_sprite(&texture, &unit_quad(0.0, 0.0), Technique::Hued);
        batcher.end();

        assert!(!batcher.is_started());
        assert_eq!(batcher.quad_count(), 0);
        assert_eq!(batcher.backend().run_lengths(), vec![1]);
    }

    #[test]
    fn test_light_params_reach_backend() {
        let mut batcher = batcher();
        batcher.set_light_direction(Vec3::new(0.0, -1.0, 1.0));
        batcher.set_light_intensity(0.7);
        batcher.enable_light(true);

        let backend = batcher.backend();
        assert_eq!(backend.light_directions, vec![Vec3::new(0.0, -1.0, 1.0)]);
        assert_eq!(backend.light_intensities, vec![0.7]);
        assert_eq!(backend.light_toggles, vec![true]);
    }

    #[test]
    #[should_panic(expected = "begin() called while a session is open")]
    fn test_nested_begin_panics() {
        let mut batcher = batcher();
        batcher.begin();
    }

    #[test]
    #[should_panic(expected = "end() called without an open session")]
    fn test_end_without_begin_panics() {
        let mut batcher = Batcher2D::new(RecordingBackend::new(Viewport::new(800, 600)));
        batcher.end();
    }

    #[test]
    #[should_panic(expected = "draw_sprite() outside a session")]
    fn test_draw_outside_session_panics() {
        let mut batcher = Batcher2D::new(RecordingBackend::new(Viewport::new(800, 600)));
        let texture = Texture2D::mock(16, 16);
        batcher.draw_sprite(&texture, &unit_quad(0.0, 0.0), Technique::Hued);
    }
}
