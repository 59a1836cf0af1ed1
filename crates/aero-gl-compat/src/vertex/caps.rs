use bitflags::bitflags;
use tracing::debug;

use super::{VertexFormatDesc, VertexUsage};

bitflags! {
    /// Vertex attributes available to a shader, used only for variant selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VertexFormatCaps: u8 {
        const POSITION = 1 << 0;
        const COLOR = 1 << 1;
        const UV0 = 1 << 2;
        const UV1 = 1 << 3;
        const UV2 = 1 << 4;
        const NORMAL = 1 << 5;
    }
}

fn classify(usage: VertexUsage, usage_index: u8) -> VertexFormatCaps {
    match usage {
        VertexUsage::Position => VertexFormatCaps::POSITION,
        VertexUsage::Color => VertexFormatCaps::COLOR,
        VertexUsage::Normal => VertexFormatCaps::NORMAL,
        VertexUsage::TexCoord => match usage_index {
            0 => VertexFormatCaps::UV0,
            1 => VertexFormatCaps::UV1,
            2 => VertexFormatCaps::UV2,
            other => {
                debug!(usage_index = other, "unclassifiable texcoord index; treating as uv0");
                VertexFormatCaps::UV0
            }
        },
        VertexUsage::Tangent
        | VertexUsage::BlendWeight
        | VertexUsage::BlendIndices
        | VertexUsage::PointSize
        | VertexUsage::Padding => VertexFormatCaps::empty(),
    }
}

/// Reduces a vertex layout to its capability bitmask.
///
/// Pure and order-independent: only the set of `(usage, usage_index)` pairs matters.
pub fn analyze(desc: &VertexFormatDesc) -> VertexFormatCaps {
    desc.elements
        .iter()
        .fold(VertexFormatCaps::empty(), |caps, e| caps | classify(e.usage, e.usage_index))
}
