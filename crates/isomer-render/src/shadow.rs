//! Flattened shadow projection for world sprites.

use glam::Vec2;

use crate::vertex::Quad;

/// Skews a sprite quad in place into the parallelogram of its drop shadow.
///
/// Each vertex of the top and bottom edge pairs is shifted in both x and y by
/// half its vertical distance to `anchor`, collapsing the sprite toward the
/// ground line through the anchor. `flipped` selects which physical vertices
/// form the top pair, so mirrored sprites slant the same way as unmirrored
/// ones.
pub fn skew_shadow(quad: &mut Quad, anchor: Vec2, flipped: bool) {
    let skew_top = (quad[0].position.y - anchor.y) * 0.5;
    let skew_bottom = (quad[3].position.y - anchor.y) * 0.5;

    let (top, bottom) = if flipped { (2, 1) } else { (1, 2) };

    quad[0].position.x -= skew_top;
    quad[0].position.y -= skew_top;
    quad[top].position.x -= skew_top;
    quad[top].position.y -= skew_top;
    quad[bottom].position.x -= skew_bottom;
    quad[bottom].position.y -= skew_bottom;
    quad[3].position.x -= skew_bottom;
    quad[3].position.y -= skew_bottom;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{UvRect, make_quad};
    use glam::Vec3;

    #[test]
    fn test_zero_skew_at_anchor_height() {
        // All four vertices share the anchor's y, so the skew must vanish.
        let mut quad = make_quad(10.0, 50.0, 20.0, 0.0, UvRect::FULL, Vec3::ZERO);
        let original = quad;

        skew_shadow(&mut quad, Vec2::new(0.0, 50.0), false);
        assert_eq!(quad, original);

        skew_shadow(&mut quad, Vec2::new(0.0, 50.0), true);
        assert_eq!(quad, original);
    }

    #[test]
    fn test_skew_is_half_vertical_distance() {
        let mut quad = make_quad(0.0, 0.0, 10.0, 10.0, UvRect::FULL, Vec3::ZERO);
        skew_shadow(&mut quad, Vec2::new(0.0, 20.0), false);

        // Top edge: (0 - 20) * 0.5 = -10, shifted by +10 in x and y.
        assert_eq!(quad[0].position, Vec3::new(10.0, 10.0, 0.0));
        assert_eq!(quad[1].position, Vec3::new(20.0, 10.0, 0.0));
        // Bottom edge: (10 - 20) * 0.5 = -5, shifted by +5.
        assert_eq!(quad[2].position, Vec3::new(5.0, 15.0, 0.0));
        assert_eq!(quad[3].position, Vec3::new(15.0, 15.0, 0.0));
    }

    #[test]
    fn test_flip_swaps_middle_vertices() {
        let base = make_quad(0.0, 0.0, 10.0, 10.0, UvRect::FULL, Vec3::ZERO);
        let anchor = Vec2::new(0.0, 20.0);

        let mut plain = base;
        skew_shadow(&mut plain, anchor, false);
        let mut mirrored = base;
        skew_shadow(&mut mirrored, anchor, true);

        // Corner vertices take the same skew either way.
        assert_eq!(plain[0], mirrored[0]);
        assert_eq!(plain[3], mirrored[3]);
        // The middle pair trades top for bottom skew.
        assert_eq!(mirrored[1].position, Vec3::new(15.0, 5.0, 0.0));
        assert_eq!(mirrored[2].position, Vec3::new(10.0, 20.0, 0.0));
    }
}
