//! Render state tracked between flushes.
//!
//! The batcher owns one [`RenderState`] and passes it by reference into every
//! flush. Any setter that would affect already-staged quads flushes first, so
//! a single GPU draw call never mixes two state configurations.

use glam::Mat4;
use isomer_core::geometry::Rect;

/// Predefined blend modes for sprite composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Default)]
pub enum BlendMode {
    /// No blending - source completely replaces destination.
    Replace,

    /// Standard alpha blending, the default for sprites and UI.
    #[default]
    Alpha,

    /// Premultiplied alpha, for compositing pre-blended atlases.
    PremultipliedAlpha,

    /// Additive blending, for light glows and spell effects.
    Additive,

    /// Multiplicative blending, for darkening overlays.
    Multiply,

    /// Custom blend state for advanced use cases.
    Custom(wgpu::BlendState),
}

impl BlendMode {
    /// Convert to wgpu BlendState.
    pub fn to_blend_state(self) -> wgpu::BlendState {
        match self {
            BlendMode::Replace => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::PremultipliedAlpha => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            BlendMode::Multiply => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Dst,
                    dst_factor: wgpu::BlendFactor::Zero,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::DstAlpha,
                    dst_factor: wgpu::BlendFactor::Zero,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            BlendMode::Custom(state) => state,
        }
    }
}

impl From<wgpu::BlendState> for BlendMode {
    fn from(state: wgpu::BlendState) -> Self {
        BlendMode::Custom(state)
    }
}

/// Depth/stencil configurations the batcher can switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Default)]
pub enum StencilMode {
    /// No depth or stencil interaction.
    #[default]
    Off,

    /// Depth test and write, for world-layer ordering.
    Depth,

    /// Write the stencil buffer, always passing, to mask regions for later
    /// passes. Depth is left untouched.
    MarkStencil,
}

impl StencilMode {
    /// Convert to a wgpu depth-stencil state for the given attachment format.
    pub fn to_depth_stencil_state(self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        let mut state = wgpu::DepthStencilState {
            format,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        };

        match self {
            StencilMode::Off => {}
            StencilMode::Depth => {
                state.depth_write_enabled = true;
                state.depth_compare = wgpu::CompareFunction::LessEqual;
            }
            StencilMode::MarkStencil => {
                let face = wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Replace,
                };
                state.stencil = wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: !0,
                    write_mask: !0,
                };
            }
        }

        state
    }
}

/// Render target extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel-space orthographic projection, y-down, origin top-left.
    ///
    /// Recomputed from the current extent on every state apply: the target
    /// may be resized between frames, so this is never cached across them.
    pub fn ortho_projection(self) -> Mat4 {
        Mat4::orthographic_rh(
            0.0,
            self.width as f32,
            self.height as f32,
            0.0,
            -1.0,
            1.0,
        )
    }
}

/// The full render state in effect for a flush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub blend: BlendMode,
    pub stencil: StencilMode,
    /// Whether the scissor test applies. Toggling is idempotent at the
    /// batcher level; the backend clamps to `scissor_rect` when enabled.
    pub scissor: bool,
    /// Scissor rectangle in target pixels; the full viewport when `None`.
    pub scissor_rect: Option<Rect<u32>>,
    /// World transform, combined with the orthographic projection per flush.
    pub transform: Mat4,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            blend: BlendMode::default(),
            stencil: StencilMode::default(),
            scissor: false,
            scissor_rect: None,
            transform: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = RenderState::default();
        assert_eq!(state.blend, BlendMode::Alpha);
        assert_eq!(state.stencil, StencilMode::Off);
        assert!(!state.scissor);
        assert_eq!(state.transform, Mat4::IDENTITY);
    }

    #[test]
    fn test_projection_maps_viewport_corners() {
        let viewport = Viewport::new(800, 600);
        let projection = viewport.ortho_projection();

        let origin = projection.project_point3(glam::Vec3::ZERO);
        assert!((origin.x - -1.0).abs() < 1e-6);
        assert!((origin.y - 1.0).abs() < 1e-6);

        let corner = projection.project_point3(glam::Vec3::new(800.0, 600.0, 0.0));
        assert!((corner.x - 1.0).abs() < 1e-6);
        assert!((corner.y - -1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mark_stencil_writes() {
        let state = StencilMode::MarkStencil
            .to_depth_stencil_state(wgpu::TextureFormat::Depth24PlusStencil8);
        assert!(!state.depth_write_enabled);
        assert_eq!(state.stencil.front.pass_op, wgpu::StencilOperation::Replace);
        assert_eq!(state.stencil.write_mask, !0);
    }
}
