//! Headless backend that records every call.
//!
//! Used by the test suite and by embedders that want to inspect the translated command stream
//! without a GPU. Individual operations can be scripted to fail so the recovery paths are reachable.

use hashbrown::{HashMap, HashSet};

use super::{
    Backend, BufferKind, DrawArgs, DrawIndexedArgs, NativeHandle, PipelineLinkDesc, RenderState,
    ShaderStage,
};
use crate::error::BackendError;
use crate::state::{ScissorRect, Viewport};
use crate::vertex::{VertexFormatCaps, VertexFormatDesc};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CompileShader {
        stage: ShaderStage,
        handle: NativeHandle,
    },
    LinkPipeline {
        label: String,
        handle: NativeHandle,
        vertex_caps: VertexFormatCaps,
        uniform_buffer_size: u64,
    },
    CreateBuffer {
        kind: BufferKind,
        len: usize,
        handle: NativeHandle,
    },
    UpdateBuffer {
        buffer: NativeHandle,
        offset: u64,
        len: usize,
    },
    CreateTexture {
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        handle: NativeHandle,
    },
    CreateFramebuffer {
        color: NativeHandle,
        depth: Option<NativeHandle>,
        handle: NativeHandle,
    },
    BindPipeline(NativeHandle),
    BindTexture {
        slot: u32,
        texture: NativeHandle,
    },
    BindConstantBuffer {
        slot: u32,
        buffer: NativeHandle,
    },
    UploadConstantBuffer {
        buffer: NativeHandle,
        bytes: Vec<u8>,
    },
    BindRenderTarget(Option<NativeHandle>),
    SetRenderState(RenderState),
    SetViewport(Viewport),
    SetScissor(Option<ScissorRect>),
    BindVertexBuffer {
        buffer: NativeHandle,
        stride: u64,
    },
    BindIndexBuffer {
        buffer: NativeHandle,
        format: wgpu::IndexFormat,
    },
    Draw(DrawArgs),
    DrawIndexed(DrawIndexedArgs),
    Destroy(NativeHandle),
}

/// Operations that can be scripted to fail once via [`RecordingBackend::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOp {
    CreateBuffer,
    CreateTexture,
    BindPipeline,
    BindTexture,
    UploadConstantBuffer,
    Draw,
    DrawIndexed,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<BackendCommand>,
    next_handle: u64,
    live: HashSet<NativeHandle>,
    buffer_contents: HashMap<NativeHandle, Vec<u8>>,
    unavailable: Option<String>,
    compile_fail_markers: Vec<String>,
    link_fail_labels: Vec<String>,
    pending_failures: HashMap<FailOp, u32>,
    failed_calls: u64,
    invalid_destroys: u64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose [`Backend::init`] fails, modelling a missing native library.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            unavailable: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Any shader source containing `marker` fails to compile.
    pub fn fail_compile_containing(&mut self, marker: &str) {
        self.compile_fail_markers.push(marker.to_string());
    }

    /// Linking a pipeline with this label fails.
    pub fn fail_link_for(&mut self, label: &str) {
        self.link_fail_labels.push(label.to_string());
    }

    /// The next call to `op` fails.
    pub fn fail_next(&mut self, op: FailOp) {
        *self.pending_failures.entry(op).or_insert(0) += 1;
    }

    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn count(&self, pred: impl Fn(&BackendCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    /// Number of `draw`/`draw_indexed` calls recorded.
    pub fn draw_calls(&self) -> usize {
        self.count(|c| matches!(c, BackendCommand::Draw(_) | BackendCommand::DrawIndexed(_)))
    }

    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.live.contains(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Last contents written to a buffer (creation, update or constant upload).
    pub fn buffer_contents(&self, handle: NativeHandle) -> Option<&[u8]> {
        self.buffer_contents.get(&handle).map(Vec::as_slice)
    }

    pub fn failed_calls(&self) -> u64 {
        self.failed_calls
    }

    /// Destroy requests for handles that were unknown or already destroyed.
    pub fn invalid_destroys(&self) -> u64 {
        self.invalid_destroys
    }

    fn alloc(&mut self) -> NativeHandle {
        self.next_handle += 1;
        let handle = NativeHandle(self.next_handle);
        self.live.insert(handle);
        handle
    }

    fn check(&mut self, op: FailOp, name: &'static str) -> Result<(), BackendError> {
        if let Some(remaining) = self.pending_failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                self.failed_calls += 1;
                return Err(BackendError::Call {
                    op: name,
                    message: "scripted failure".to_string(),
                });
            }
        }
        Ok(())
    }

    fn require_live(&mut self, handle: NativeHandle) -> Result<(), BackendError> {
        if self.live.contains(&handle) {
            Ok(())
        } else {
            self.failed_calls += 1;
            Err(BackendError::UnknownHandle(handle))
        }
    }
}

impl Backend for RecordingBackend {
    fn init(&mut self) -> Result<(), BackendError> {
        match &self.unavailable {
            Some(reason) => Err(BackendError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn compile_shader_stage(
        &mut self,
        source: &str,
        stage: ShaderStage,
    ) -> Result<NativeHandle, BackendError> {
        if let Some(marker) = self
            .compile_fail_markers
            .iter()
            .find(|m| source.contains(m.as_str()))
        {
            self.failed_calls += 1;
            return Err(BackendError::CompileFailed {
                stage,
                message: format!("source contains {marker:?}"),
            });
        }
        let handle = self.alloc();
        self.commands.push(BackendCommand::CompileShader { stage, handle });
        Ok(handle)
    }

    fn link_pipeline(&mut self, desc: &PipelineLinkDesc<'_>) -> Result<NativeHandle, BackendError> {
        self.require_live(desc.vertex_shader)?;
        self.require_live(desc.fragment_shader)?;
        if self.link_fail_labels.iter().any(|l| l == desc.label) {
            self.failed_calls += 1;
            return Err(BackendError::LinkFailed(format!("{} refused", desc.label)));
        }
        let handle = self.alloc();
        self.commands.push(BackendCommand::LinkPipeline {
            label: desc.label.to_string(),
            handle,
            vertex_caps: desc.vertex_caps,
            uniform_buffer_size: desc.uniform_buffer_size,
        });
        Ok(handle)
    }

    fn create_buffer(&mut self, bytes: &[u8], kind: BufferKind) -> Result<NativeHandle, BackendError> {
        self.check(FailOp::CreateBuffer, "create_buffer")?;
        let handle = self.alloc();
        self.buffer_contents.insert(handle, bytes.to_vec());
        self.commands.push(BackendCommand::CreateBuffer {
            kind,
            len: bytes.len(),
            handle,
        });
        Ok(handle)
    }

    fn update_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        self.require_live(buffer)?;
        let contents = self.buffer_contents.entry(buffer).or_default();
        let dst = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(bytes.len())?))
            .and_then(|range| contents.get_mut(range))
            .ok_or_else(|| BackendError::Call {
                op: "update_buffer",
                message: format!("{} bytes at offset {offset} out of range", bytes.len()),
            })?;
        dst.copy_from_slice(bytes);
        self.commands.push(BackendCommand::UpdateBuffer {
            buffer,
            offset,
            len: bytes.len(),
        });
        Ok(())
    }

    fn create_texture(
        &mut self,
        _pixels: &[u8],
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<NativeHandle, BackendError> {
        self.check(FailOp::CreateTexture, "create_texture")?;
        let handle = self.alloc();
        self.commands.push(BackendCommand::CreateTexture {
            width,
            height,
            format,
            handle,
        });
        Ok(handle)
    }

    fn create_framebuffer(
        &mut self,
        color: NativeHandle,
        depth: Option<NativeHandle>,
    ) -> Result<NativeHandle, BackendError> {
        self.require_live(color)?;
        if let Some(depth) = depth {
            self.require_live(depth)?;
        }
        let handle = self.alloc();
        self.commands.push(BackendCommand::CreateFramebuffer {
            color,
            depth,
            handle,
        });
        Ok(handle)
    }

    fn bind_pipeline(&mut self, pipeline: NativeHandle) -> Result<(), BackendError> {
        self.check(FailOp::BindPipeline, "bind_pipeline")?;
        self.require_live(pipeline)?;
        self.commands.push(BackendCommand::BindPipeline(pipeline));
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, texture: NativeHandle) -> Result<(), BackendError> {
        self.check(FailOp::BindTexture, "bind_texture")?;
        self.require_live(texture)?;
        self.commands.push(BackendCommand::BindTexture { slot, texture });
        Ok(())
    }

    fn bind_constant_buffer(&mut self, slot: u32, buffer: NativeHandle) -> Result<(), BackendError> {
        self.require_live(buffer)?;
        self.commands
            .push(BackendCommand::BindConstantBuffer { slot, buffer });
        Ok(())
    }

    fn upload_constant_buffer(&mut self, buffer: NativeHandle, bytes: &[u8]) -> Result<(), BackendError> {
        self.check(FailOp::UploadConstantBuffer, "upload_constant_buffer")?;
        self.require_live(buffer)?;
        self.buffer_contents.insert(buffer, bytes.to_vec());
        self.commands.push(BackendCommand::UploadConstantBuffer {
            buffer,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn bind_render_target(&mut self, framebuffer: Option<NativeHandle>) -> Result<(), BackendError> {
        if let Some(fb) = framebuffer {
            self.require_live(fb)?;
        }
        self.commands
            .push(BackendCommand::BindRenderTarget(framebuffer));
        Ok(())
    }

    fn set_render_state(&mut self, state: &RenderState) -> Result<(), BackendError> {
        self.commands.push(BackendCommand::SetRenderState(*state));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<(), BackendError> {
        self.commands.push(BackendCommand::SetViewport(viewport));
        Ok(())
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) -> Result<(), BackendError> {
        self.commands.push(BackendCommand::SetScissor(rect));
        Ok(())
    }

    fn bind_vertex_buffer(
        &mut self,
        buffer: NativeHandle,
        layout: &VertexFormatDesc,
    ) -> Result<(), BackendError> {
        self.require_live(buffer)?;
        self.commands.push(BackendCommand::BindVertexBuffer {
            buffer,
            stride: layout.stride,
        });
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        buffer: NativeHandle,
        format: wgpu::IndexFormat,
    ) -> Result<(), BackendError> {
        self.require_live(buffer)?;
        self.commands
            .push(BackendCommand::BindIndexBuffer { buffer, format });
        Ok(())
    }

    fn draw(&mut self, args: DrawArgs) -> Result<(), BackendError> {
        self.check(FailOp::Draw, "draw")?;
        self.commands.push(BackendCommand::Draw(args));
        Ok(())
    }

    fn draw_indexed(&mut self, args: DrawIndexedArgs) -> Result<(), BackendError> {
        self.check(FailOp::DrawIndexed, "draw_indexed")?;
        self.commands.push(BackendCommand::DrawIndexed(args));
        Ok(())
    }

    fn destroy_resource(&mut self, handle: NativeHandle) {
        if self.live.remove(&handle) {
            self.buffer_contents.remove(&handle);
        } else {
            self.invalid_destroys += 1;
        }
        self.commands.push(BackendCommand::Destroy(handle));
    }
}
