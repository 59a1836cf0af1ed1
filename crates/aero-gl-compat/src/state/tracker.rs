//! Mirror of the fixed-function state the legacy client believes it is manipulating.
//!
//! The tracker never talks to the backend. Every setter is idempotent: writing the value already
//! recorded changes nothing and counts no transition, so redundant client traffic costs one
//! comparison. The draw translator reads the whole snapshot at draw time.

use tracing::debug;

use crate::registry::LegacyHandle;
use crate::vertex::{analyze, VertexFormatCaps, VertexFormatDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullFace {
    Front,
    #[default]
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

/// Legacy RGBA write mask: bit 0 = red, 1 = green, 2 = blue, 3 = alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorWriteMask(pub u8);

impl ColorWriteMask {
    pub const ALL: ColorWriteMask = ColorWriteMask(0b1111);
    pub const NONE: ColorWriteMask = ColorWriteMask(0);

    pub const fn from_rgba(r: bool, g: bool, b: bool, a: bool) -> Self {
        ColorWriteMask((r as u8) | (g as u8) << 1 | (b as u8) << 2 | (a as u8) << 3)
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendMode {
    pub enabled: bool,
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub equation: BlendEquation,
}

impl Default for BlendMode {
    fn default() -> Self {
        Self {
            enabled: false,
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
            equation: BlendEquation::Add,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthMode {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub func: CompareFunc,
}

impl Default for DepthMode {
    fn default() -> Self {
        Self {
            test_enabled: false,
            write_enabled: true,
            func: CompareFunc::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CullMode {
    pub enabled: bool,
    pub face: CullFace,
    pub front_face: FrontFace,
}

impl CullMode {
    /// Legacy front-and-back culling discards every polygon; the backend has no equivalent.
    pub fn culls_all_polygons(&self) -> bool {
        self.enabled && self.face == CullFace::FrontAndBack
    }
}

/// Legacy viewport rectangle in window pixels, origin bottom-left as the client sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyStateSnapshot {
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub cull: CullMode,
    pub scissor_enabled: bool,
    pub scissor: ScissorRect,
    pub viewport: Viewport,
    pub color_mask: ColorWriteMask,
    pub active_texture_unit: u32,
    /// Bound texture per unit; `LegacyHandle::NONE` when the unit is empty.
    pub textures: Vec<LegacyHandle>,
    pub program: LegacyHandle,
    /// `NONE` selects the default target.
    pub framebuffer: LegacyHandle,
    pub vertex_format: Option<VertexFormatDesc>,
    pub vertex_caps: VertexFormatCaps,
}

impl LegacyStateSnapshot {
    fn new(texture_units: usize) -> Self {
        Self {
            blend: BlendMode::default(),
            depth: DepthMode::default(),
            cull: CullMode::default(),
            scissor_enabled: false,
            scissor: ScissorRect::default(),
            viewport: Viewport::default(),
            color_mask: ColorWriteMask::ALL,
            active_texture_unit: 0,
            textures: vec![LegacyHandle::NONE; texture_units],
            program: LegacyHandle::NONE,
            framebuffer: LegacyHandle::NONE,
            vertex_format: None,
            vertex_caps: VertexFormatCaps::empty(),
        }
    }

    /// Scissor rectangle when scissoring is enabled.
    pub fn effective_scissor(&self) -> Option<ScissorRect> {
        self.scissor_enabled.then_some(self.scissor)
    }
}

#[derive(Debug)]
pub struct LegacyStateTracker {
    state: LegacyStateSnapshot,
    transitions: u64,
}

impl LegacyStateTracker {
    pub fn new(texture_units: u32) -> Self {
        let units = texture_units.max(1) as usize;
        Self {
            state: LegacyStateSnapshot::new(units),
            transitions: 0,
        }
    }

    /// Restores session-start defaults.
    pub fn reset(&mut self) {
        self.state = LegacyStateSnapshot::new(self.state.textures.len());
        debug!("legacy state tracker reset");
    }

    pub fn snapshot(&self) -> &LegacyStateSnapshot {
        &self.state
    }

    pub fn texture_units(&self) -> u32 {
        self.state.textures.len() as u32
    }

    /// Number of setter calls that actually changed state.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    fn changed(&mut self) -> bool {
        self.transitions += 1;
        true
    }

    pub fn set_blend(&mut self, enabled: bool, src: BlendFactor, dst: BlendFactor) -> bool {
        let blend = BlendMode {
            enabled,
            src,
            dst,
            ..self.state.blend
        };
        if self.state.blend == blend {
            return false;
        }
        self.state.blend = blend;
        self.changed()
    }

    pub fn set_blend_equation(&mut self, equation: BlendEquation) -> bool {
        if self.state.blend.equation == equation {
            return false;
        }
        self.state.blend.equation = equation;
        self.changed()
    }

    pub fn set_depth_test(&mut self, enabled: bool, func: CompareFunc) -> bool {
        if self.state.depth.test_enabled == enabled && self.state.depth.func == func {
            return false;
        }
        self.state.depth.test_enabled = enabled;
        self.state.depth.func = func;
        self.changed()
    }

    pub fn set_depth_write(&mut self, enabled: bool) -> bool {
        if self.state.depth.write_enabled == enabled {
            return false;
        }
        self.state.depth.write_enabled = enabled;
        self.changed()
    }

    pub fn set_cull(&mut self, enabled: bool, face: CullFace) -> bool {
        if self.state.cull.enabled == enabled && self.state.cull.face == face {
            return false;
        }
        self.state.cull.enabled = enabled;
        self.state.cull.face = face;
        self.changed()
    }

    pub fn set_front_face(&mut self, front_face: FrontFace) -> bool {
        if self.state.cull.front_face == front_face {
            return false;
        }
        self.state.cull.front_face = front_face;
        self.changed()
    }

    pub fn set_scissor(&mut self, enabled: bool, rect: ScissorRect) -> bool {
        if self.state.scissor_enabled == enabled && self.state.scissor == rect {
            return false;
        }
        self.state.scissor_enabled = enabled;
        self.state.scissor = rect;
        self.changed()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        if self.state.viewport == viewport {
            return false;
        }
        self.state.viewport = viewport;
        self.changed()
    }

    pub fn set_color_mask(&mut self, mask: ColorWriteMask) -> bool {
        let mask = ColorWriteMask(mask.0 & ColorWriteMask::ALL.0);
        if self.state.color_mask == mask {
            return false;
        }
        self.state.color_mask = mask;
        self.changed()
    }

    /// Selects the unit targeted by [`Self::bind_texture`]. Out-of-range units are ignored.
    pub fn set_active_texture_unit(&mut self, unit: u32) -> bool {
        if unit >= self.texture_units() {
            debug!(unit, units = self.texture_units(), "ignoring out-of-range texture unit");
            return false;
        }
        if self.state.active_texture_unit == unit {
            return false;
        }
        self.state.active_texture_unit = unit;
        self.transitions += 1;
        true
    }

    /// Binds `texture` to the active unit.
    pub fn bind_texture(&mut self, texture: LegacyHandle) -> bool {
        self.bind_texture_unit(self.state.active_texture_unit, texture)
    }

    pub fn bind_texture_unit(&mut self, unit: u32, texture: LegacyHandle) -> bool {
        let Some(slot) = self.state.textures.get_mut(unit as usize) else {
            debug!(unit, %texture, "ignoring texture bind to out-of-range unit");
            return false;
        };
        if *slot == texture {
            return false;
        }
        *slot = texture;
        self.changed()
    }

    pub fn bound_texture(&self, unit: u32) -> LegacyHandle {
        self.state
            .textures
            .get(unit as usize)
            .copied()
            .unwrap_or(LegacyHandle::NONE)
    }

    /// Non-empty units in ascending slot order.
    pub fn bound_textures(&self) -> impl Iterator<Item = (u32, LegacyHandle)> + '_ {
        self.state
            .textures
            .iter()
            .enumerate()
            .filter(|(_, handle)| handle.is_some())
            .map(|(slot, handle)| (slot as u32, *handle))
    }

    /// Clears `texture` from every unit it is bound to (legacy delete semantics).
    pub fn unbind_texture_everywhere(&mut self, texture: LegacyHandle) -> bool {
        if texture.is_none() {
            return false;
        }
        let mut any = false;
        for slot in self.state.textures.iter_mut().filter(|slot| **slot == texture) {
            *slot = LegacyHandle::NONE;
            any = true;
        }
        if any {
            self.changed();
        }
        any
    }

    pub fn use_program(&mut self, program: LegacyHandle) -> bool {
        if self.state.program == program {
            return false;
        }
        self.state.program = program;
        self.changed()
    }

    pub fn bound_program(&self) -> LegacyHandle {
        self.state.program
    }

    pub fn bind_framebuffer(&mut self, framebuffer: LegacyHandle) -> bool {
        if self.state.framebuffer == framebuffer {
            return false;
        }
        self.state.framebuffer = framebuffer;
        self.changed()
    }

    pub fn bound_framebuffer(&self) -> LegacyHandle {
        self.state.framebuffer
    }

    /// Records the client's current vertex layout and derives its capabilities.
    pub fn set_vertex_format(&mut self, desc: &VertexFormatDesc) -> bool {
        if self.state.vertex_format.as_ref() == Some(desc) {
            return false;
        }
        self.state.vertex_caps = analyze(desc);
        self.state.vertex_format = Some(desc.clone());
        self.changed()
    }

    pub fn vertex_format(&self) -> Option<&VertexFormatDesc> {
        self.state.vertex_format.as_ref()
    }

    pub fn vertex_caps(&self) -> VertexFormatCaps {
        self.state.vertex_caps
    }
}
