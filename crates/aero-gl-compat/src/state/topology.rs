use std::fmt;

/// Primitive types the legacy client can draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LegacyPrimitive {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
}

impl LegacyPrimitive {
    /// Whether face culling applies to this primitive.
    pub fn is_polygon(self) -> bool {
        matches!(
            self,
            LegacyPrimitive::Triangles
                | LegacyPrimitive::TriangleStrip
                | LegacyPrimitive::TriangleFan
                | LegacyPrimitive::Quads
        )
    }
}

impl fmt::Display for LegacyPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LegacyPrimitive::Points => "points",
            LegacyPrimitive::Lines => "lines",
            LegacyPrimitive::LineStrip => "line_strip",
            LegacyPrimitive::LineLoop => "line_loop",
            LegacyPrimitive::Triangles => "triangles",
            LegacyPrimitive::TriangleStrip => "triangle_strip",
            LegacyPrimitive::TriangleFan => "triangle_fan",
            LegacyPrimitive::Quads => "quads",
        };
        f.write_str(s)
    }
}

/// CPU index expansion needed for primitives the backend cannot draw directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TopologyEmulation {
    TriangleFan,
    Quads,
    LineLoop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimitiveTopologyTranslation {
    pub topology: wgpu::PrimitiveTopology,
    pub emulation: Option<TopologyEmulation>,
}

pub fn translate_primitive_topology(primitive: LegacyPrimitive) -> PrimitiveTopologyTranslation {
    use wgpu::PrimitiveTopology as T;

    let (topology, emulation) = match primitive {
        LegacyPrimitive::Points => (T::PointList, None),
        LegacyPrimitive::Lines => (T::LineList, None),
        LegacyPrimitive::LineStrip => (T::LineStrip, None),
        // Closing segment is appended as an extra line; a strip cannot express it.
        LegacyPrimitive::LineLoop => (T::LineList, Some(TopologyEmulation::LineLoop)),
        LegacyPrimitive::Triangles => (T::TriangleList, None),
        LegacyPrimitive::TriangleStrip => (T::TriangleStrip, None),
        LegacyPrimitive::TriangleFan => (T::TriangleList, Some(TopologyEmulation::TriangleFan)),
        LegacyPrimitive::Quads => (T::TriangleList, Some(TopologyEmulation::Quads)),
    };
    PrimitiveTopologyTranslation { topology, emulation }
}

/// Expand a triangle-fan into a triangle-list: triangle(i) = (0, i, i+1).
pub fn expand_triangle_fan_u32(indices: &[u32]) -> Vec<u32> {
    if indices.len() < 3 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((indices.len() - 2) * 3);
    for i in 1..(indices.len() - 1) {
        out.push(indices[0]);
        out.push(indices[i]);
        out.push(indices[i + 1]);
    }
    out
}

/// Expand quads into a triangle-list: (a, b, c, d) becomes (a, b, c) (a, c, d).
/// A trailing partial quad is dropped.
pub fn expand_quads_u32(indices: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(indices.len() / 4 * 6);
    for quad in indices.chunks_exact(4) {
        out.extend_from_slice(&[quad[0], quad[1], quad[2], quad[0], quad[2], quad[3]]);
    }
    out
}

/// Expand a line loop into a line-list, including the closing (last, first) segment.
pub fn expand_line_loop_u32(indices: &[u32]) -> Vec<u32> {
    if indices.len() < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(indices.len() * 2);
    for pair in indices.windows(2) {
        out.push(pair[0]);
        out.push(pair[1]);
    }
    if indices.len() > 2 {
        out.push(indices[indices.len() - 1]);
        out.push(indices[0]);
    }
    out
}

pub fn expand_emulated_u32(emulation: TopologyEmulation, indices: &[u32]) -> Vec<u32> {
    match emulation {
        TopologyEmulation::TriangleFan => expand_triangle_fan_u32(indices),
        TopologyEmulation::Quads => expand_quads_u32(indices),
        TopologyEmulation::LineLoop => expand_line_loop_u32(indices),
    }
}

/// Build an index buffer for a non-indexed emulated draw starting at `first_vertex`.
pub fn expand_emulated_nonindexed_u32(
    emulation: TopologyEmulation,
    first_vertex: u32,
    vertex_count: u32,
) -> Vec<u32> {
    let sequential: Vec<u32> = (0..vertex_count)
        .map(|i| first_vertex.wrapping_add(i))
        .collect();
    expand_emulated_u32(emulation, &sequential)
}
