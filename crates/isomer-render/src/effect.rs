//! The isometric sprite effect: techniques and the shader parameter block.
//!
//! The shader itself is opaque to the batching engine; the engine only picks
//! a technique per draw-call group and feeds the globals uniform.

use bytemuck::{Pod, Zeroable};

/// Named shader execution path selected per draw-call group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Default)]
pub enum Technique {
    /// Hued sprite path, the default for world and UI sprites.
    #[default]
    Hued,
    /// Flattened drop shadows.
    Shadow,
    /// Terrain tiles with normal-based directional lighting.
    Land,
}

impl Technique {
    /// Fragment entry point implementing this technique.
    pub fn fragment_entry(self) -> &'static str {
        match self {
            Technique::Hued => "fs_hued",
            Technique::Shadow => "fs_shadow",
            Technique::Land => "fs_land",
        }
    }
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Technique::Hued => write!(f, "hued"),
            Technique::Shadow => write!(f, "shadow"),
            Technique::Land => write!(f, "land"),
        }
    }
}

/// Per-flush shader globals. 160 bytes, 16-byte aligned, matching the WGSL
/// `Globals` struct layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Globals {
    /// Combined `ortho(viewport) * world` matrix.
    pub projection: [[f32; 4]; 4],
    /// World transform alone.
    pub world: [[f32; 4]; 4],
    /// Target extent in pixels.
    pub viewport: [f32; 2],
    pub light_intensity: f32,
    /// 1.0 when directional lighting applies, 0.0 otherwise.
    pub light_enabled: f32,
    pub light_direction: [f32; 3],
    /// Palette rows per atlas; constant per backend, set at construction.
    pub hues_per_texture: f32,
}

impl Globals {
    /// Size of the uniform block in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// WGSL source for the sprite effect. One vertex entry point and one fragment
/// entry point per technique.
pub const SPRITE_SHADER: &str = r#"
struct Globals {
    projection: mat4x4<f32>,
    world: mat4x4<f32>,
    viewport: vec2<f32>,
    light_intensity: f32,
    light_enabled: f32,
    light_direction: vec3<f32>,
    hues_per_texture: f32,
}

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var sprite_texture: texture_2d<f32>;
@group(1) @binding(1)
var sprite_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tex_coord: vec3<f32>,
    @location(3) hue: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
    @location(1) hue: vec3<f32>,
    @location(2) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = globals.projection * vec4<f32>(input.position, 1.0);
    out.tex_coord = input.tex_coord.xy;
    out.hue = input.hue;
    out.normal = input.normal;
    return out;
}

@fragment
fn fs_hued(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSample(sprite_texture, sprite_sampler, input.tex_coord);
    // hue.x selects a palette row when non-zero; the resolved tint triple
    // modulates the sample directly.
    if input.hue.x > 0.0 {
        color = vec4<f32>(color.rgb * input.hue, color.a);
    }
    return color;
}

@fragment
fn fs_shadow(input: VertexOutput) -> @location(0) vec4<f32> {
    let alpha = textureSample(sprite_texture, sprite_sampler, input.tex_coord).a;
    return vec4<f32>(0.0, 0.0, 0.0, alpha * 0.5);
}

@fragment
fn fs_land(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSample(sprite_texture, sprite_sampler, input.tex_coord);
    if globals.light_enabled > 0.5 {
        let diffuse = max(dot(normalize(input.normal), normalize(globals.light_direction)), 0.0);
        let shade = mix(1.0 - globals.light_intensity, 1.0, diffuse);
        color = vec4<f32>(color.rgb * shade, color.a);
    }
    return color;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals_size() {
        assert_eq!(std::mem::size_of::<Globals>(), 160);
    }

    #[test]
    fn test_globals_alignment() {
        // light_direction must sit on a 16-byte boundary for the WGSL layout.
        assert_eq!(std::mem::offset_of!(Globals, light_direction) % 16, 0);
    }

    #[test]
    fn test_fragment_entries_are_distinct() {
        assert_ne!(Technique::Hued.fragment_entry(), Technique::Shadow.fragment_entry());
        assert_ne!(Technique::Shadow.fragment_entry(), Technique::Land.fragment_entry());
    }
}
