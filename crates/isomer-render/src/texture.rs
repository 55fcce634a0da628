//! Texture handles consumed by the batcher.
//!
//! The batching engine only needs a handle's identity (run coalescing compares
//! handles, never pixel content) and its dimensions (for quad construction).
//! Handles can wrap a real GPU texture or a mock, so flush logic is testable
//! without a device.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::GraphicsContext;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// A cheap-to-clone sprite texture handle with a stable identity.
///
/// Two handles compare equal iff they refer to the same underlying texture;
/// the flush run partitioning relies on exactly this.
#[derive(Clone, Debug)]
pub struct Texture2D {
    inner: Arc<TextureInner>,
}

#[derive(Debug)]
struct TextureInner {
    id: u64,
    width: u32,
    height: u32,
    kind: TextureKind,
}

#[derive(Debug)]
enum TextureKind {
    Real {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    #[cfg(any(test, feature = "mock"))]
    Mock,
}

impl Texture2D {
    /// Wraps an existing GPU texture.
    pub fn from_wgpu(texture: wgpu::Texture, view: wgpu::TextureView) -> Self {
        let size = texture.size();
        Self {
            inner: Arc::new(TextureInner {
                id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
                width: size.width,
                height: size.height,
                kind: TextureKind::Real { texture, view },
            }),
        }
    }

    /// Uploads raw RGBA pixel data into a new sprite texture.
    pub fn from_rgba8(context: &GraphicsContext, data: &[u8], width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = context.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("sprite_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        context.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self::from_wgpu(texture, view)
    }

    /// Create a mock texture handle (for testing).
    #[cfg(any(test, feature = "mock"))]
    pub fn mock(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
                width,
                height,
                kind: TextureKind::Mock,
            }),
        }
    }

    /// Create a mock handle that fails the validity check, standing in for a
    /// disposed texture.
    #[cfg(any(test, feature = "mock"))]
    pub fn mock_disposed() -> Self {
        Self::mock(0, 0)
    }

    /// Stable identity used for run coalescing and bind-group caching.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Whether the handle refers to a usable texture. Invalid handles are
    /// silently rejected by the submit paths.
    pub fn is_valid(&self) -> bool {
        self.inner.width > 0 && self.inner.height > 0
    }

    /// Get the texture view for binding.
    ///
    /// # Panics
    /// Panics if this is a mock handle (mocks never reach a real backend).
    pub fn view(&self) -> &wgpu::TextureView {
        match &self.inner.kind {
            TextureKind::Real { view, .. } => view,
            #[cfg(any(test, feature = "mock"))]
            TextureKind::Mock => {
                panic!("Attempted to get wgpu::TextureView from mock texture")
            }
        }
    }

    /// Get the underlying texture.
    ///
    /// # Panics
    /// Panics if this is a mock handle.
    pub fn texture(&self) -> &wgpu::Texture {
        match &self.inner.kind {
            TextureKind::Real { texture, .. } => texture,
            #[cfg(any(test, feature = "mock"))]
            TextureKind::Mock => {
                panic!("Attempted to get wgpu::Texture from mock texture")
            }
        }
    }

    /// Check if this is a mock (useful in tests)
    #[cfg(any(test, feature = "mock"))]
    pub fn is_mock(&self) -> bool {
        matches!(self.inner.kind, TextureKind::Mock)
    }
}

impl PartialEq for Texture2D {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Texture2D {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_not_content() {
        let a = Texture2D::mock(64, 64);
        let b = Texture2D::mock(64, 64);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_disposed_is_invalid() {
        assert!(!Texture2D::mock_disposed().is_valid());
        assert!(Texture2D::mock(1, 1).is_valid());
    }
}
