//! Client vertex layout descriptors and their reduction to a capability bitmask.

mod caps;

pub use caps::{analyze, VertexFormatCaps};

use std::fmt;

/// Semantic meaning of a vertex element, as declared by the legacy client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexUsage {
    Position,
    Color,
    TexCoord,
    Normal,
    Tangent,
    BlendWeight,
    BlendIndices,
    PointSize,
    /// Bytes the client skips over (legacy "padding" elements).
    Padding,
}

impl fmt::Display for VertexUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VertexUsage::Position => "position",
            VertexUsage::Color => "color",
            VertexUsage::TexCoord => "texcoord",
            VertexUsage::Normal => "normal",
            VertexUsage::Tangent => "tangent",
            VertexUsage::BlendWeight => "blend_weight",
            VertexUsage::BlendIndices => "blend_indices",
            VertexUsage::PointSize => "point_size",
            VertexUsage::Padding => "padding",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub usage: VertexUsage,
    pub usage_index: u8,
    pub format: wgpu::VertexFormat,
    pub offset: u64,
}

impl VertexElement {
    pub const fn new(usage: VertexUsage, usage_index: u8, format: wgpu::VertexFormat, offset: u64) -> Self {
        Self {
            usage,
            usage_index,
            format,
            offset,
        }
    }
}

/// An interleaved vertex layout: elements plus the stride of one vertex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexFormatDesc {
    pub elements: Vec<VertexElement>,
    pub stride: u64,
}

impl VertexFormatDesc {
    /// Packs `elements` back to back, computing offsets and stride from each format's size.
    pub fn packed(elements: impl IntoIterator<Item = (VertexUsage, u8, wgpu::VertexFormat)>) -> Self {
        let mut offset = 0;
        let elements = elements
            .into_iter()
            .map(|(usage, usage_index, format)| {
                let element = VertexElement::new(usage, usage_index, format, offset);
                offset += format.size();
                element
            })
            .collect();
        Self {
            elements,
            stride: offset,
        }
    }

    pub fn caps(&self) -> VertexFormatCaps {
        analyze(self)
    }
}
