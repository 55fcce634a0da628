//! Batched 2D sprite rendering for an isometric game client.
//!
//! Draw requests (world sprites, shadows, UI images) are staged CPU-side and
//! coalesced into one indexed GPU draw call per maximal run of consecutive
//! quads sharing a texture. Render state changes (blend, stencil, scissor,
//! transform, technique) flush the staged quads first, so no single draw call
//! mixes two state configurations.
//!
//! # Example
//!
//! ```ignore
//! let context = GraphicsContext::new_sync();
//! let backend = WgpuBackend::new(context, surface_format, 800, 600, 3000.0);
//! let mut batcher = Batcher2D::new(backend);
//!
//! // once per frame:
//! batcher.backend_mut().begin_frame(&mut encoder, &view, Some(wgpu::Color::BLACK));
//! batcher.begin();
//! batcher.draw_2d(&texture, Pos::new(10, 10), Vec3::ZERO);
//! batcher.end();
//! batcher.backend_mut().end_frame();
//! queue.submit(std::iter::once(encoder.finish()));
//! ```

pub mod backend;
pub mod batcher;
pub mod context;
pub mod effect;
pub mod index;
pub mod shadow;
pub mod state;
pub mod texture;
pub mod vertex;
pub mod wgpu_backend;

pub use backend::GraphicsBackend;
pub use batcher::Batcher2D;
pub use context::GraphicsContext;
pub use effect::Technique;
pub use state::{BlendMode, RenderState, StencilMode, Viewport};
pub use texture::Texture2D;
pub use vertex::{Quad, SpriteVertex, UvRect};
pub use wgpu_backend::WgpuBackend;
