//! The static triangle-list index pattern shared by every flush.

/// Maximum number of quads staged between flushes.
pub const MAX_QUADS: usize = 0x800;
/// Vertices held by a full staging buffer.
pub const MAX_VERTICES: usize = MAX_QUADS * 4;
/// Indices covering a full staging buffer.
pub const MAX_INDICES: usize = MAX_QUADS * 6;

/// Generates the index sequence for `max_quads` quads: for quad `j` the two
/// triangles `(4j, 4j+1, 4j+2)` and `(4j+1, 4j+3, 4j+2)`.
///
/// Computed once at startup and uploaded once; never regenerated.
pub fn generate_index_pattern(max_quads: usize) -> Vec<u16> {
    debug_assert!(max_quads * 4 <= u16::MAX as usize + 1);

    let mut indices = Vec::with_capacity(max_quads * 6);
    for quad in 0..max_quads as u16 {
        let base = quad * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 1, base + 3, base + 2]);
    }
    indices
}
