//! Translation of one legacy draw into the backend's ordered bind/draw sequence.
//!
//! Binding a pipeline resets shader-resource slots on many backends, so the emitted order is fixed:
//! pipeline, textures recorded by the tracker, constant buffer, fixed-function state, vertex/index
//! buffers, draw. Every lookup that can fail (program, buffers, framebuffer) happens before the first
//! backend call, so a skipped draw emits nothing.

use std::sync::Arc;

use hashbrown::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{Backend, BufferKind, DrawArgs, DrawIndexedArgs, NativeHandle, RenderState};
use crate::config::TranslatorConfig;
use crate::error::BackendError;
use crate::registry::{LegacyHandle, ResourceCategory, ResourceRegistry};
use crate::shader::{Pipeline, PipelineId, PipelineManager};
use crate::state::topology::{expand_emulated_nonindexed_u32, expand_emulated_u32};
use crate::state::{build_render_state, translate_primitive_topology, LegacyPrimitive, LegacyStateTracker};
use crate::state::{ScissorRect, Viewport};
use crate::uniform::{build_layout, SupplierContext, UniformBufferLayout, UniformSuppliers};
use crate::warn_limit::WarnLimiter;

/// One legacy draw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub primitive: LegacyPrimitive,
    pub vertex_buffer: LegacyHandle,
    /// `NONE` selects the non-indexed path.
    pub index_buffer: LegacyHandle,
    /// Vertex count (non-indexed) or index count (indexed).
    pub count: u32,
    /// First vertex (non-indexed) or first index (indexed).
    pub first: u32,
    pub base_vertex: i32,
    pub instance_count: u32,
}

impl DrawCall {
    pub fn arrays(primitive: LegacyPrimitive, vertex_buffer: LegacyHandle, first: u32, count: u32) -> Self {
        Self {
            primitive,
            vertex_buffer,
            index_buffer: LegacyHandle::NONE,
            count,
            first,
            base_vertex: 0,
            instance_count: 1,
        }
    }

    pub fn elements(
        primitive: LegacyPrimitive,
        vertex_buffer: LegacyHandle,
        index_buffer: LegacyHandle,
        first: u32,
        count: u32,
    ) -> Self {
        Self {
            index_buffer,
            ..Self::arrays(primitive, vertex_buffer, first, count)
        }
    }

    pub fn with_instances(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }

    pub fn with_base_vertex(mut self, base_vertex: i32) -> Self {
        self.base_vertex = base_vertex;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("no program bound")]
    NoProgram,
    #[error("program {0} has no shader attached")]
    ProgramWithoutShader(LegacyHandle),
    #[error("no vertex format set")]
    MissingVertexFormat,
    #[error("vertex buffer {0} does not resolve")]
    UnresolvedVertexBuffer(LegacyHandle),
    #[error("index buffer {0} does not resolve")]
    UnresolvedIndexBuffer(LegacyHandle),
    #[error("index range is outside the contents of index buffer {0}")]
    IndexRangeOutOfBounds(LegacyHandle),
    #[error("framebuffer {0} does not resolve")]
    UnresolvedFramebuffer(LegacyHandle),
    #[error("no usable pipeline for shader {0:?}")]
    UnusablePipeline(String),
    #[error("backend call failed: {0}")]
    Backend(BackendError),
}

impl SkipReason {
    /// Stable category name, independent of the handles involved.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::NoProgram => "no_program",
            SkipReason::ProgramWithoutShader(_) => "program_without_shader",
            SkipReason::MissingVertexFormat => "missing_vertex_format",
            SkipReason::UnresolvedVertexBuffer(_) => "unresolved_vertex_buffer",
            SkipReason::UnresolvedIndexBuffer(_) => "unresolved_index_buffer",
            SkipReason::IndexRangeOutOfBounds(_) => "index_range_out_of_bounds",
            SkipReason::UnresolvedFramebuffer(_) => "unresolved_framebuffer",
            SkipReason::UnusablePipeline(_) => "unusable_pipeline",
            SkipReason::Backend(_) => "backend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    Submitted,
    /// Nothing to draw (zero counts, empty expansion, or everything culled).
    NoOp,
    Skipped(SkipReason),
}

/// CPU copy of an index buffer, kept for topologies that need index expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBufferShadow {
    pub format: wgpu::IndexFormat,
    pub bytes: Vec<u8>,
}

impl Default for IndexBufferShadow {
    fn default() -> Self {
        Self {
            format: wgpu::IndexFormat::Uint16,
            bytes: Vec::new(),
        }
    }
}

impl IndexBufferShadow {
    /// Writes `bytes` at `offset`. Writes past the end are rejected and leave the shadow untouched.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> bool {
        let Ok(start) = usize::try_from(offset) else {
            return false;
        };
        let Some(end) = start.checked_add(bytes.len()) else {
            return false;
        };
        match self.bytes.get_mut(start..end) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Reads `count` indices starting at index `first`, widened to `u32`.
    pub fn indices(&self, first: u32, count: u32) -> Option<Vec<u32>> {
        let stride = match self.format {
            wgpu::IndexFormat::Uint16 => 2,
            wgpu::IndexFormat::Uint32 => 4,
        };
        let start = (first as usize).checked_mul(stride)?;
        let end = start.checked_add((count as usize).checked_mul(stride)?)?;
        let bytes = self.bytes.get(start..end)?;
        Some(match self.format {
            wgpu::IndexFormat::Uint16 => bytes
                .chunks_exact(2)
                .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            wgpu::IndexFormat::Uint32 => bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        })
    }
}

/// Everything a draw reads but does not own.
#[derive(Clone, Copy)]
pub struct DrawEnv<'a> {
    pub registry: &'a ResourceRegistry,
    pub tracker: &'a LegacyStateTracker,
    pub suppliers: &'a UniformSuppliers,
    /// Shader name attached to each program handle.
    pub programs: &'a HashMap<LegacyHandle, String>,
    pub index_buffers: &'a HashMap<LegacyHandle, IndexBufferShadow>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub submitted: u64,
    pub skipped: u64,
    pub noop: u64,
    pub texture_rebinds: u64,
    pub uniform_uploads: u64,
    pub render_state_applies: u64,
}

/// Last state actually applied to the backend; `None` forces re-emission.
#[derive(Debug, Default)]
struct AppliedState {
    render_state: Option<RenderState>,
    viewport: Option<Viewport>,
    scissor: Option<Option<ScissorRect>>,
    render_target: Option<Option<NativeHandle>>,
}

/// Buffers resolved before any backend call.
struct ResolvedDraw {
    vertex_buffer: NativeHandle,
    index_buffer: Option<(NativeHandle, wgpu::IndexFormat)>,
    render_target: Option<NativeHandle>,
    topology: wgpu::PrimitiveTopology,
    expanded: Option<Vec<u32>>,
}

#[derive(Debug)]
pub struct DrawTranslator {
    coalesce_state: bool,
    layouts: HashMap<PipelineId, UniformBufferLayout>,
    applied: AppliedState,
    warnings: WarnLimiter,
    stats: DrawStats,
}

impl DrawTranslator {
    pub fn new(config: &TranslatorConfig) -> Self {
        Self {
            coalesce_state: config.coalesce_state,
            layouts: HashMap::new(),
            applied: AppliedState::default(),
            warnings: WarnLimiter::new(config.warn_interval),
            stats: DrawStats::default(),
        }
    }

    pub fn stats(&self) -> DrawStats {
        self.stats
    }

    pub fn layout(&self, pipeline: PipelineId) -> Option<&UniformBufferLayout> {
        self.layouts.get(&pipeline)
    }

    pub fn layout_mut(&mut self, pipeline: PipelineId) -> Option<&mut UniformBufferLayout> {
        self.layouts.get_mut(&pipeline)
    }

    /// Layout of `pipeline`, built and bound to `suppliers` on first use.
    pub fn layout_for(
        &mut self,
        pipeline: &Pipeline,
        suppliers: &UniformSuppliers,
    ) -> &mut UniformBufferLayout {
        self.layouts
            .entry(pipeline.id)
            .or_insert_with(|| build_layout(pipeline, suppliers))
    }

    /// Forgets what was applied to the backend so the next draw re-emits all fixed-function state.
    pub fn reset_applied_state(&mut self) {
        self.applied = AppliedState::default();
        self.warnings.reset();
    }

    /// Destroys the constant buffers of the given pipelines and drops their layouts.
    pub fn release_layouts(&mut self, backend: &mut dyn Backend, pipelines: &[PipelineId]) {
        for id in pipelines {
            if let Some(mut layout) = self.layouts.remove(id) {
                layout.release(backend);
            }
        }
    }

    /// Destroys every constant buffer and drops all layouts.
    pub fn release_all_layouts(&mut self, backend: &mut dyn Backend) {
        for (_, mut layout) in self.layouts.drain() {
            layout.release(backend);
        }
    }

    pub fn draw(
        &mut self,
        backend: &mut dyn Backend,
        pipelines: &mut PipelineManager,
        env: &DrawEnv<'_>,
        call: &DrawCall,
    ) -> DrawOutcome {
        let outcome = self.translate(backend, pipelines, env, call);
        match &outcome {
            DrawOutcome::Submitted => self.stats.submitted += 1,
            DrawOutcome::NoOp => self.stats.noop += 1,
            DrawOutcome::Skipped(reason) => {
                self.stats.skipped += 1;
                if let Some(occurrences) = self.warnings.hit(reason.kind()) {
                    warn!(%reason, primitive = %call.primitive, occurrences, "skipping draw");
                }
            }
        }
        outcome
    }

    fn translate(
        &mut self,
        backend: &mut dyn Backend,
        pipelines: &mut PipelineManager,
        env: &DrawEnv<'_>,
        call: &DrawCall,
    ) -> DrawOutcome {
        if call.count == 0 || call.instance_count == 0 {
            return DrawOutcome::NoOp;
        }
        let snapshot = env.tracker.snapshot();
        if call.primitive.is_polygon() && snapshot.cull.culls_all_polygons() {
            debug!(primitive = %call.primitive, "front-and-back culling discards the draw");
            return DrawOutcome::NoOp;
        }

        let program = env.tracker.bound_program();
        if program.is_none() || !env.registry.is_live(ResourceCategory::Program, program) {
            return DrawOutcome::Skipped(SkipReason::NoProgram);
        }
        let Some(shader_name) = env.programs.get(&program) else {
            return DrawOutcome::Skipped(SkipReason::ProgramWithoutShader(program));
        };
        let Some(vertex_format) = env.tracker.vertex_format() else {
            return DrawOutcome::Skipped(SkipReason::MissingVertexFormat);
        };

        let resolved = match Self::resolve(env, call) {
            Ok(resolved) => resolved,
            Err(outcome) => return outcome,
        };

        let Some(pipeline) =
            pipelines.get_or_create_pipeline(backend, shader_name, env.tracker.vertex_caps())
        else {
            return DrawOutcome::Skipped(SkipReason::UnusablePipeline(shader_name.clone()));
        };

        if let Err(err) = backend.bind_pipeline(pipeline.pipeline) {
            return DrawOutcome::Skipped(SkipReason::Backend(err));
        }
        self.rebind_textures(backend, env);
        self.flush_uniforms(backend, env, &pipeline);
        self.apply_fixed_function(backend, env, resolved.render_target);

        if let Err(err) = backend.bind_vertex_buffer(resolved.vertex_buffer, vertex_format) {
            return DrawOutcome::Skipped(SkipReason::Backend(err));
        }

        let result = match (&resolved.expanded, resolved.index_buffer) {
            (Some(indices), _) => Self::draw_expanded(backend, call, &resolved, indices),
            (None, Some((buffer, format))) => backend.bind_index_buffer(buffer, format).and_then(|()| {
                backend.draw_indexed(DrawIndexedArgs {
                    topology: resolved.topology,
                    index_count: call.count,
                    first_index: call.first,
                    base_vertex: call.base_vertex,
                    instance_count: call.instance_count,
                })
            }),
            (None, None) => backend.draw(DrawArgs {
                topology: resolved.topology,
                vertex_count: call.count,
                first_vertex: call.first,
                instance_count: call.instance_count,
            }),
        };
        match result {
            Ok(()) => DrawOutcome::Submitted,
            Err(err) => DrawOutcome::Skipped(SkipReason::Backend(err)),
        }
    }

    /// Pure lookups; no backend traffic.
    fn resolve(env: &DrawEnv<'_>, call: &DrawCall) -> Result<ResolvedDraw, DrawOutcome> {
        let skip = |reason| Err(DrawOutcome::Skipped(reason));

        let Some(vertex_buffer) = env
            .registry
            .resolve(ResourceCategory::VertexBuffer, call.vertex_buffer)
        else {
            return skip(SkipReason::UnresolvedVertexBuffer(call.vertex_buffer));
        };

        let shadow = env.index_buffers.get(&call.index_buffer);
        let index_buffer = if call.is_indexed() {
            let Some(native) = env
                .registry
                .resolve(ResourceCategory::IndexBuffer, call.index_buffer)
            else {
                return skip(SkipReason::UnresolvedIndexBuffer(call.index_buffer));
            };
            let format = shadow.map_or(wgpu::IndexFormat::Uint16, |s| s.format);
            Some((native, format))
        } else {
            None
        };

        let framebuffer = env.tracker.bound_framebuffer();
        let render_target = if framebuffer.is_some() {
            let Some(native) = env.registry.resolve(ResourceCategory::Framebuffer, framebuffer) else {
                return skip(SkipReason::UnresolvedFramebuffer(framebuffer));
            };
            Some(native)
        } else {
            None
        };

        let translation = translate_primitive_topology(call.primitive);
        let expanded = match translation.emulation {
            None => None,
            Some(emulation) => {
                let indices = if call.is_indexed() {
                    let Some(source) = shadow.and_then(|s| s.indices(call.first, call.count)) else {
                        return skip(SkipReason::IndexRangeOutOfBounds(call.index_buffer));
                    };
                    expand_emulated_u32(emulation, &source)
                } else {
                    expand_emulated_nonindexed_u32(emulation, call.first, call.count)
                };
                if indices.is_empty() {
                    return Err(DrawOutcome::NoOp);
                }
                Some(indices)
            }
        };

        Ok(ResolvedDraw {
            vertex_buffer,
            index_buffer,
            render_target,
            topology: translation.topology,
            expanded,
        })
    }

    fn rebind_textures(&mut self, backend: &mut dyn Backend, env: &DrawEnv<'_>) {
        for (slot, handle) in env.tracker.bound_textures() {
            let Some(native) = env.registry.resolve(ResourceCategory::Texture, handle) else {
                let key = format!("unresolved texture slot {slot}");
                if let Some(occurrences) = self.warnings.hit(&key) {
                    warn!(slot, %handle, occurrences, "bound texture does not resolve; leaving slot empty");
                }
                continue;
            };
            match backend.bind_texture(slot, native) {
                Ok(()) => self.stats.texture_rebinds += 1,
                Err(err) => warn!(slot, %handle, error = %err, "texture bind failed"),
            }
        }
    }

    fn flush_uniforms(&mut self, backend: &mut dyn Backend, env: &DrawEnv<'_>, pipeline: &Arc<Pipeline>) {
        let cx = SupplierContext {
            state: env.tracker.snapshot(),
        };
        let layout = self.layout_for(pipeline, env.suppliers);
        layout.refresh(env.suppliers, &cx);
        let uploaded = layout.flush_if_dirty(backend);
        let buffer = layout.buffer();
        if uploaded {
            self.stats.uniform_uploads += 1;
        }
        if let Some(buffer) = buffer {
            if let Err(err) = backend.bind_constant_buffer(0, buffer) {
                warn!(pipeline = %pipeline.name, error = %err, "constant buffer bind failed");
            }
        }
    }

    fn apply_fixed_function(
        &mut self,
        backend: &mut dyn Backend,
        env: &DrawEnv<'_>,
        render_target: Option<NativeHandle>,
    ) {
        let snapshot = env.tracker.snapshot();
        let coalesce = self.coalesce_state;

        if !coalesce || self.applied.render_target != Some(render_target) {
            self.applied.render_target = match backend.bind_render_target(render_target) {
                Ok(()) => Some(render_target),
                Err(err) => {
                    warn!(error = %err, "render target bind failed");
                    None
                }
            };
        }

        let render_state = build_render_state(snapshot);
        if !coalesce || self.applied.render_state != Some(render_state) {
            self.applied.render_state = match backend.set_render_state(&render_state) {
                Ok(()) => {
                    self.stats.render_state_applies += 1;
                    Some(render_state)
                }
                Err(err) => {
                    warn!(error = %err, "render state update failed");
                    None
                }
            };
        }

        if !coalesce || self.applied.viewport != Some(snapshot.viewport) {
            self.applied.viewport = match backend.set_viewport(snapshot.viewport) {
                Ok(()) => Some(snapshot.viewport),
                Err(err) => {
                    warn!(error = %err, "viewport update failed");
                    None
                }
            };
        }

        let scissor = snapshot.effective_scissor();
        if !coalesce || self.applied.scissor != Some(scissor) {
            self.applied.scissor = match backend.set_scissor(scissor) {
                Ok(()) => Some(scissor),
                Err(err) => {
                    warn!(error = %err, "scissor update failed");
                    None
                }
            };
        }
    }

    /// Draws through a transient `u32` index buffer that is released right after the draw.
    fn draw_expanded(
        backend: &mut dyn Backend,
        call: &DrawCall,
        resolved: &ResolvedDraw,
        indices: &[u32],
    ) -> Result<(), BackendError> {
        let buffer = backend.create_buffer(bytemuck::cast_slice(indices), BufferKind::Index)?;
        let base_vertex = if call.is_indexed() { call.base_vertex } else { 0 };
        let result = backend
            .bind_index_buffer(buffer, wgpu::IndexFormat::Uint32)
            .and_then(|()| {
                backend.draw_indexed(DrawIndexedArgs {
                    topology: resolved.topology,
                    index_count: indices.len() as u32,
                    first_index: 0,
                    base_vertex,
                    instance_count: call.instance_count,
                })
            });
        backend.destroy_resource(buffer);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;
    use crate::shader::MemoryShaderSource;
    use crate::vertex::{VertexFormatDesc, VertexUsage};

    #[test]
    fn index_shadow_reads_u16_and_u32() {
        let mut shadow = IndexBufferShadow {
            bytes: vec![0; 8],
            ..IndexBufferShadow::default()
        };
        assert!(shadow.write(0, bytemuck::cast_slice(&[3u16, 4, 5, 6])));
        assert_eq!(shadow.indices(1, 2), Some(vec![4, 5]));
        assert_eq!(shadow.indices(3, 2), None);

        let shadow = IndexBufferShadow {
            format: wgpu::IndexFormat::Uint32,
            bytes: bytemuck::cast_slice(&[7u32, 8]).to_vec(),
        };
        assert_eq!(shadow.indices(0, 2), Some(vec![7, 8]));
    }

    #[test]
    fn shadow_write_stays_in_bounds() {
        let mut shadow = IndexBufferShadow {
            bytes: vec![0; 6],
            ..IndexBufferShadow::default()
        };
        assert!(shadow.write(4, &[1, 0]));
        assert_eq!(shadow.indices(2, 1), Some(vec![1]));

        assert!(!shadow.write(5, &[1, 0]));
        assert!(!shadow.write(u64::MAX - 1, &[1, 0, 0]));
        assert_eq!(shadow.bytes, vec![0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn repeated_skips_share_one_warning_key() {
        let config = TranslatorConfig::default();
        let mut translator = DrawTranslator::new(&config);
        let mut pipelines = PipelineManager::new(Box::new(MemoryShaderSource::new()), &config);
        let mut backend = RecordingBackend::new();

        let mut registry = ResourceRegistry::new();
        let program = registry.allocate(ResourceCategory::Program);
        let mut tracker = LegacyStateTracker::new(4);
        tracker.use_program(program);
        tracker.set_vertex_format(&VertexFormatDesc::packed([(
            VertexUsage::Position,
            0,
            wgpu::VertexFormat::Float32x3,
        )]));
        let programs = HashMap::from_iter([(program, "position".to_string())]);
        let suppliers = UniformSuppliers::new();
        let index_buffers = HashMap::new();
        let env = DrawEnv {
            registry: &registry,
            tracker: &tracker,
            suppliers: &suppliers,
            programs: &programs,
            index_buffers: &index_buffers,
        };

        for handle in 1..=64 {
            let call = DrawCall::arrays(LegacyPrimitive::Triangles, LegacyHandle(handle), 0, 3);
            assert!(matches!(
                translator.draw(&mut backend, &mut pipelines, &env, &call),
                DrawOutcome::Skipped(SkipReason::UnresolvedVertexBuffer(_))
            ));
        }
        assert_eq!(translator.warnings.len(), 1);
        assert_eq!(translator.stats().skipped, 64);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn skip_kind_ignores_handles() {
        assert_eq!(
            SkipReason::UnresolvedIndexBuffer(LegacyHandle(1)).kind(),
            SkipReason::UnresolvedIndexBuffer(LegacyHandle(9)).kind()
        );
        assert_ne!(
            SkipReason::UnresolvedIndexBuffer(LegacyHandle(1)).kind(),
            SkipReason::UnresolvedVertexBuffer(LegacyHandle(1)).kind()
        );
    }

    #[test]
    fn draw_call_builders() {
        let call = DrawCall::elements(LegacyPrimitive::Triangles, LegacyHandle(1), LegacyHandle(2), 0, 6)
            .with_instances(4)
            .with_base_vertex(-2);
        assert!(call.is_indexed());
        assert_eq!(call.instance_count, 4);
        assert_eq!(call.base_vertex, -2);
        assert!(!DrawCall::arrays(LegacyPrimitive::Points, LegacyHandle(1), 0, 1).is_indexed());
    }
}
