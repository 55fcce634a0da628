//! Quad geometry: the fixed 4-vertex sprite unit and its GPU layout.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use isomer_core::geometry::Rect;

/// A single sprite vertex.
///
/// 48 bytes. `normal` doubles as a per-vertex lighting passthrough for the
/// land technique, `tex_coord.z` is reserved, and `hue` carries the tint
/// triple resolved by the caller (palette lookup happens upstream).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec3,
    pub hue: Vec3,
}

impl SpriteVertex {
    /// Size of one vertex in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Returns the wgpu vertex buffer layout.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRS: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
            // location 0: position (vec3)
            0 => Float32x3,
            // location 1: normal (vec3)
            1 => Float32x3,
            // location 2: tex_coord (vec3, z reserved)
            2 => Float32x3,
            // location 3: hue (vec3)
            3 => Float32x3,
        ];

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: ATTRS,
        }
    }
}

/// A quad in draw order {top-left, top-right, bottom-left, bottom-right}.
///
/// The four vertices are always staged and read as one contiguous block.
pub type Quad = [SpriteVertex; 4];

/// Normalized texture-space rectangle covered by a quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub u_min: f32,
    pub v_min: f32,
    pub u_max: f32,
    pub v_max: f32,
}

impl UvRect {
    /// The whole texture.
    pub const FULL: Self = Self {
        u_min: 0.0,
        v_min: 0.0,
        u_max: 1.0,
        v_max: 1.0,
    };

    /// UVs covering `source` (in texture pixels) of a
    /// `tex_width` x `tex_height` texture.
    pub fn from_source(source: Rect<i32>, tex_width: u32, tex_height: u32) -> Self {
        let w = tex_width as f32;
        let h = tex_height as f32;
        Self {
            u_min: source.x as f32 / w,
            v_min: source.y as f32 / h,
            u_max: source.right() as f32 / w,
            v_max: source.bottom() as f32 / h,
        }
    }
}

/// Builds the standard axis-aligned sprite quad.
pub fn make_quad(x: f32, y: f32, width: f32, height: f32, uv: UvRect, hue: Vec3) -> Quad {
    let v = |px: f32, py: f32, u: f32, t: f32| SpriteVertex {
        position: Vec3::new(px, py, 0.0),
        normal: Vec3::Z,
        tex_coord: Vec3::new(u, t, 0.0),
        hue,
    };

    [
        v(x, y, uv.u_min, uv.v_min),
        v(x + width, y, uv.u_max, uv.v_min),
        v(x, y + height, uv.u_min, uv.v_max),
        v(x + width, y + height, uv.u_max, uv.v_max),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprite_vertex_size() {
        assert_eq!(std::mem::size_of::<SpriteVertex>(), 48);
    }

    #[test]
    fn test_uv_from_source() {
        let uv = UvRect::from_source(Rect::new(32, 16, 32, 48), 128, 64);
        assert_eq!(uv.u_min, 0.25);
        assert_eq!(uv.v_min, 0.25);
        assert_eq!(uv.u_max, 0.5);
        assert_eq!(uv.v_max, 1.0);
    }

    #[test]
    fn test_quad_winding() {
        let quad = make_quad(10.0, 20.0, 30.0, 40.0, UvRect::FULL, Vec3::ZERO);

        // {TL, TR, BL, BR}
        assert_eq!(quad[0].position, Vec3::new(10.0, 20.0, 0.0));
        assert_eq!(quad[1].position, Vec3::new(40.0, 20.0, 0.0));
        assert_eq!(quad[2].position, Vec3::new(10.0, 60.0, 0.0));
        assert_eq!(quad[3].position, Vec3::new(40.0, 60.0, 0.0));

        assert_eq!(quad[1].tex_coord, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(quad[2].tex_coord, Vec3::new(0.0, 1.0, 0.0));
    }
}
