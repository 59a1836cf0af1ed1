//! Fixed-function state: the client-side mirror and its translation to backend enums.

pub mod topology;
pub mod tracker;
pub mod translate;

pub use topology::{translate_primitive_topology, LegacyPrimitive, PrimitiveTopologyTranslation, TopologyEmulation};
pub use tracker::{
    BlendEquation, BlendFactor, BlendMode, ColorWriteMask, CompareFunc, CullFace, CullMode, DepthMode,
    FrontFace, LegacyStateSnapshot, LegacyStateTracker, ScissorRect, Viewport,
};
pub use translate::{
    build_render_state, translate_blend_equation, translate_blend_factor, translate_color_write_mask,
    translate_compare_func, translate_cull,
};
