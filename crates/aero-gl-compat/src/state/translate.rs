use crate::backend::RenderState;

use super::tracker::{
    BlendEquation, BlendFactor, BlendMode, ColorWriteMask, CompareFunc, CullFace, CullMode, FrontFace,
    LegacyStateSnapshot,
};

pub fn translate_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstantColor => wgpu::BlendFactor::OneMinusConstant,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

pub fn translate_blend_equation(equation: BlendEquation) -> wgpu::BlendOperation {
    match equation {
        BlendEquation::Add => wgpu::BlendOperation::Add,
        BlendEquation::Subtract => wgpu::BlendOperation::Subtract,
        BlendEquation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendEquation::Min => wgpu::BlendOperation::Min,
        BlendEquation::Max => wgpu::BlendOperation::Max,
    }
}

pub fn translate_compare_func(func: CompareFunc) -> wgpu::CompareFunction {
    match func {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::Always => wgpu::CompareFunction::Always,
    }
}

/// Returns `(front_face, cull_mode)`.
///
/// Front-and-back culling has no backend face; it maps to `Back` and the draw translator drops
/// polygon draws entirely while it is active.
pub fn translate_cull(cull: &CullMode) -> (wgpu::FrontFace, Option<wgpu::Face>) {
    let front_face = match cull.front_face {
        FrontFace::Ccw => wgpu::FrontFace::Ccw,
        FrontFace::Cw => wgpu::FrontFace::Cw,
    };
    if !cull.enabled {
        return (front_face, None);
    }
    let face = match cull.face {
        CullFace::Front => wgpu::Face::Front,
        CullFace::Back | CullFace::FrontAndBack => wgpu::Face::Back,
    };
    (front_face, Some(face))
}

pub fn translate_color_write_mask(mask: ColorWriteMask) -> wgpu::ColorWrites {
    let mut out = wgpu::ColorWrites::empty();
    if mask.0 & 0b0001 != 0 {
        out |= wgpu::ColorWrites::RED;
    }
    if mask.0 & 0b0010 != 0 {
        out |= wgpu::ColorWrites::GREEN;
    }
    if mask.0 & 0b0100 != 0 {
        out |= wgpu::ColorWrites::BLUE;
    }
    if mask.0 & 0b1000 != 0 {
        out |= wgpu::ColorWrites::ALPHA;
    }
    out
}

fn translate_blend(blend: &BlendMode) -> Option<wgpu::BlendState> {
    if !blend.enabled {
        return None;
    }
    let operation = translate_blend_equation(blend.equation);
    // Min/max ignore the factors; the backend requires them to be One.
    let (src_factor, dst_factor) = match blend.equation {
        BlendEquation::Min | BlendEquation::Max => (wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        _ => (translate_blend_factor(blend.src), translate_blend_factor(blend.dst)),
    };
    let component = wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation,
    };
    Some(wgpu::BlendState {
        color: component,
        alpha: component,
    })
}

/// Folds the fixed-function snapshot into one backend render state.
pub fn build_render_state(state: &LegacyStateSnapshot) -> RenderState {
    let (front_face, cull_mode) = translate_cull(&state.cull);
    let depth_compare = if state.depth.test_enabled {
        translate_compare_func(state.depth.func)
    } else {
        wgpu::CompareFunction::Always
    };
    RenderState {
        blend: translate_blend(&state.blend),
        depth_compare,
        // Legacy depth writes only happen while the depth test is enabled.
        depth_write_enabled: state.depth.test_enabled && state.depth.write_enabled,
        cull_mode,
        front_face,
        color_writes: translate_color_write_mask(state.color_mask),
    }
}
