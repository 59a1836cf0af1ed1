//! Interface to the native GPU layer.
//!
//! The backend owns device/context creation, shader compilation to machine code, command submission
//! and presentation. This crate only consumes the calls below; enumerations use `wgpu`'s vocabulary so
//! any explicit-pipeline API can be targeted.

pub mod recording;

use std::fmt;

use crate::error::BackendError;
use crate::state::{ScissorRect, Viewport};
use crate::vertex::{VertexFormatCaps, VertexFormatDesc};

/// Opaque value returned by the backend. Owned by the backend; the registry only references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

/// Everything the backend needs to link two compiled stages into a pipeline object.
#[derive(Debug, Clone, Copy)]
pub struct PipelineLinkDesc<'a> {
    pub label: &'a str,
    pub vertex_shader: NativeHandle,
    pub fragment_shader: NativeHandle,
    /// Vertex attributes the pipeline expects, used to derive the input layout.
    pub vertex_caps: VertexFormatCaps,
    /// Size in bytes of the pipeline's constant buffer (0 when it declares no uniforms).
    pub uniform_buffer_size: u64,
    /// Texture binding slots declared by the shaders.
    pub texture_slots: &'a [u32],
}

/// Fixed-function state in backend terms. Only emitted when it differs from what was last applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub blend: Option<wgpu::BlendState>,
    /// `Always` when the legacy depth test is disabled.
    pub depth_compare: wgpu::CompareFunction,
    pub depth_write_enabled: bool,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub color_writes: wgpu::ColorWrites,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawArgs {
    pub topology: wgpu::PrimitiveTopology,
    pub vertex_count: u32,
    pub first_vertex: u32,
    pub instance_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawIndexedArgs {
    pub topology: wgpu::PrimitiveTopology,
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub instance_count: u32,
}

/// The native GPU layer consumed by the translator.
///
/// Every call that can fail returns a [`BackendError`]; callers recover locally. `destroy_resource`
/// may be called while GPU work referencing the resource is still in flight, so implementations are
/// responsible for deferring the actual deallocation (fences or reference counts).
pub trait Backend {
    /// Startup check. Failure here is the only hard error the translation layer surfaces.
    fn init(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn compile_shader_stage(
        &mut self,
        source: &str,
        stage: ShaderStage,
    ) -> Result<NativeHandle, BackendError>;

    fn link_pipeline(&mut self, desc: &PipelineLinkDesc<'_>) -> Result<NativeHandle, BackendError>;

    fn create_buffer(&mut self, bytes: &[u8], kind: BufferKind) -> Result<NativeHandle, BackendError>;

    fn update_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), BackendError>;

    fn create_texture(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<NativeHandle, BackendError>;

    fn create_framebuffer(
        &mut self,
        color: NativeHandle,
        depth: Option<NativeHandle>,
    ) -> Result<NativeHandle, BackendError>;

    /// Binds a pipeline. On many backends this resets previously bound shader-resource slots.
    fn bind_pipeline(&mut self, pipeline: NativeHandle) -> Result<(), BackendError>;

    fn bind_texture(&mut self, slot: u32, texture: NativeHandle) -> Result<(), BackendError>;

    fn bind_constant_buffer(&mut self, slot: u32, buffer: NativeHandle) -> Result<(), BackendError>;

    fn upload_constant_buffer(&mut self, buffer: NativeHandle, bytes: &[u8]) -> Result<(), BackendError>;

    /// `None` selects the default (swapchain) target.
    fn bind_render_target(&mut self, framebuffer: Option<NativeHandle>) -> Result<(), BackendError>;

    fn set_render_state(&mut self, state: &RenderState) -> Result<(), BackendError>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<(), BackendError>;

    /// `None` disables scissoring.
    fn set_scissor(&mut self, rect: Option<ScissorRect>) -> Result<(), BackendError>;

    fn bind_vertex_buffer(
        &mut self,
        buffer: NativeHandle,
        layout: &VertexFormatDesc,
    ) -> Result<(), BackendError>;

    fn bind_index_buffer(
        &mut self,
        buffer: NativeHandle,
        format: wgpu::IndexFormat,
    ) -> Result<(), BackendError>;

    fn draw(&mut self, args: DrawArgs) -> Result<(), BackendError>;

    fn draw_indexed(&mut self, args: DrawIndexedArgs) -> Result<(), BackendError>;

    /// Requests destruction of a native resource. Called exactly once per resource.
    fn destroy_resource(&mut self, handle: NativeHandle);
}
