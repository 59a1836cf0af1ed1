//! Legacy-style client API.
//!
//! [`LegacyContext`] owns the backend and every translation component. Resource calls go straight to
//! the registry and backend; state calls only touch the tracker; [`LegacyContext::draw`] is where the
//! backend sees bind/draw traffic.

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::backend::{Backend, BufferKind, NativeHandle};
use crate::config::TranslatorConfig;
use crate::draw::{DrawCall, DrawEnv, DrawOutcome, DrawTranslator, IndexBufferShadow};
use crate::error::{InitError, ResourceError, UniformError};
use crate::registry::{LegacyHandle, ResourceCategory, ResourceRegistry};
use crate::shader::{PipelineManager, ShaderSourceLoader};
use crate::state::{
    BlendEquation, BlendFactor, ColorWriteMask, CompareFunc, CullFace, FrontFace, LegacyStateTracker,
    ScissorRect, Viewport,
};
use crate::stats::TranslatorStats;
use crate::uniform::{
    SupplierContext, SupplierId, UniformBufferLayout, UniformSuppliers, UniformValue,
};
use crate::vertex::VertexFormatDesc;

/// Which legacy buffer namespace a call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

impl BufferTarget {
    pub const fn category(self) -> ResourceCategory {
        match self {
            BufferTarget::Vertex => ResourceCategory::VertexBuffer,
            BufferTarget::Index => ResourceCategory::IndexBuffer,
        }
    }

    const fn kind(self) -> BufferKind {
        match self {
            BufferTarget::Vertex => BufferKind::Vertex,
            BufferTarget::Index => BufferKind::Index,
        }
    }
}

pub struct LegacyContext<B: Backend> {
    backend: B,
    config: TranslatorConfig,
    registry: ResourceRegistry,
    tracker: LegacyStateTracker,
    pipelines: PipelineManager,
    suppliers: UniformSuppliers,
    translator: DrawTranslator,
    programs: HashMap<LegacyHandle, String>,
    buffer_sizes: HashMap<(BufferTarget, LegacyHandle), usize>,
    index_buffers: HashMap<LegacyHandle, IndexBufferShadow>,
    resources_released: u64,
}

impl<B: Backend> std::fmt::Debug for LegacyContext<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyContext")
            .field("config", &self.config)
            .field("pipelines", &self.pipelines)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> LegacyContext<B> {
    /// Validates `config` and initializes the backend. This is the only fallible entry point.
    pub fn new(
        mut backend: B,
        loader: impl ShaderSourceLoader + 'static,
        config: TranslatorConfig,
    ) -> Result<Self, InitError> {
        let config = config.validate()?;
        backend.init().map_err(InitError::BackendUnavailable)?;
        debug!(
            shader_root = %config.shader_root,
            fallback_variant = %config.fallback_variant,
            max_texture_units = config.max_texture_units,
            coalesce_state = config.coalesce_state,
            "legacy context initialized"
        );
        Ok(Self {
            pipelines: PipelineManager::new(Box::new(loader), &config),
            translator: DrawTranslator::new(&config),
            tracker: LegacyStateTracker::new(config.max_texture_units),
            registry: ResourceRegistry::new(),
            suppliers: UniformSuppliers::new(),
            programs: HashMap::new(),
            buffer_sizes: HashMap::new(),
            index_buffers: HashMap::new(),
            resources_released: 0,
            backend,
            config,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &LegacyStateTracker {
        &self.tracker
    }

    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    pub fn translator(&self) -> &DrawTranslator {
        &self.translator
    }

    pub fn suppliers_mut(&mut self) -> &mut UniformSuppliers {
        &mut self.suppliers
    }

    pub fn stats(&self) -> TranslatorStats {
        let pipelines = self.pipelines.stats();
        let draws = self.translator.stats();
        TranslatorStats {
            pipeline_cache_hits: pipelines.hits,
            pipeline_cache_misses: pipelines.misses,
            pipelines_built: pipelines.builds,
            fallbacks_used: pipelines.fallbacks,
            unusable_pipelines: pipelines.unusable,
            variant_downgrades: pipelines.downgrades,
            draws_submitted: draws.submitted,
            draws_skipped: draws.skipped,
            draws_noop: draws.noop,
            texture_rebinds: draws.texture_rebinds,
            uniform_uploads: draws.uniform_uploads,
            render_state_applies: draws.render_state_applies,
            state_transitions: self.tracker.transitions(),
            resources_released: self.resources_released,
        }
    }

    fn destroy(&mut self, native: NativeHandle) {
        self.backend.destroy_resource(native);
        self.resources_released += 1;
    }

    fn not_found(category: ResourceCategory, handle: LegacyHandle) -> ResourceError {
        warn!(?category, %handle, "handle does not resolve; ignoring call");
        ResourceError::NotFound { category, handle }
    }

    /// Attaches a freshly created native object, destroying whatever it replaces.
    fn attach(
        &mut self,
        category: ResourceCategory,
        handle: LegacyHandle,
        native: NativeHandle,
    ) -> Result<(), ResourceError> {
        match self.registry.bind(category, handle, native) {
            Ok(Some(previous)) => {
                self.destroy(previous);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(native) => {
                self.destroy(native);
                Err(Self::not_found(category, handle))
            }
        }
    }

    fn release(&mut self, category: ResourceCategory, handle: LegacyHandle) -> bool {
        if !self.registry.is_live(category, handle) {
            debug!(?category, %handle, "delete of unknown handle ignored");
            return false;
        }
        if let Some(native) = self.registry.release(category, handle) {
            self.destroy(native);
        }
        true
    }

    pub fn gen_buffer(&mut self, target: BufferTarget) -> LegacyHandle {
        let handle = self.registry.allocate(target.category());
        if target == BufferTarget::Index {
            self.index_buffers.insert(handle, IndexBufferShadow::default());
        }
        handle
    }

    /// Replaces the buffer's contents with a new native buffer.
    pub fn buffer_data(
        &mut self,
        target: BufferTarget,
        handle: LegacyHandle,
        bytes: &[u8],
    ) -> Result<(), ResourceError> {
        let category = target.category();
        if !self.registry.is_live(category, handle) {
            return Err(Self::not_found(category, handle));
        }
        let native = self.backend.create_buffer(bytes, target.kind()).map_err(|err| {
            warn!(%handle, error = %err, "buffer creation failed");
            ResourceError::from(err)
        })?;
        self.attach(category, handle, native)?;
        self.buffer_sizes.insert((target, handle), bytes.len());
        if target == BufferTarget::Index {
            self.index_buffers.entry(handle).or_default().bytes = bytes.to_vec();
        }
        Ok(())
    }

    pub fn buffer_sub_data(
        &mut self,
        target: BufferTarget,
        handle: LegacyHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), ResourceError> {
        let category = target.category();
        let Some(native) = self.registry.resolve(category, handle) else {
            return Err(Self::not_found(category, handle));
        };
        let size = self.buffer_sizes.get(&(target, handle)).copied().unwrap_or(0);
        let in_range = usize::try_from(offset)
            .ok()
            .and_then(|start| start.checked_add(bytes.len()))
            .is_some_and(|end| end <= size);
        if !in_range {
            warn!(%handle, offset, len = bytes.len(), size, "buffer update out of range; ignoring call");
            return Err(ResourceError::OutOfRange {
                handle,
                offset,
                len: bytes.len(),
                size,
            });
        }
        self.backend
            .update_buffer(native, offset, bytes)
            .map_err(|err| {
                warn!(%handle, offset, error = %err, "buffer update failed");
                ResourceError::from(err)
            })?;
        if target == BufferTarget::Index {
            if let Some(shadow) = self.index_buffers.get_mut(&handle) {
                shadow.write(offset, bytes);
            }
        }
        Ok(())
    }

    pub fn index_buffer_format(
        &mut self,
        handle: LegacyHandle,
        format: wgpu::IndexFormat,
    ) -> Result<(), ResourceError> {
        if !self.registry.is_live(ResourceCategory::IndexBuffer, handle) {
            warn!(%handle, "index format set on a non-index buffer");
            return Err(ResourceError::NotAnIndexBuffer(handle));
        }
        self.index_buffers.entry(handle).or_default().format = format;
        Ok(())
    }

    pub fn delete_buffer(&mut self, target: BufferTarget, handle: LegacyHandle) {
        if self.release(target.category(), handle) {
            self.buffer_sizes.remove(&(target, handle));
            if target == BufferTarget::Index {
                self.index_buffers.remove(&handle);
            }
        }
    }

    pub fn gen_texture(&mut self) -> LegacyHandle {
        self.registry.allocate(ResourceCategory::Texture)
    }

    pub fn tex_image_2d(
        &mut self,
        handle: LegacyHandle,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        pixels: &[u8],
    ) -> Result<(), ResourceError> {
        if !self.registry.is_live(ResourceCategory::Texture, handle) {
            return Err(Self::not_found(ResourceCategory::Texture, handle));
        }
        if let Some(block_size) = format.block_copy_size(None) {
            // Compressed formats store whole blocks; partial edge blocks still take a full block.
            let (block_width, block_height) = format.block_dimensions();
            let expected = width.div_ceil(block_width) as usize
                * height.div_ceil(block_height) as usize
                * block_size as usize;
            if pixels.len() != expected {
                warn!(%handle, width, height, ?format, expected, actual = pixels.len(), "texture upload size mismatch");
                return Err(ResourceError::TextureSizeMismatch {
                    expected,
                    actual: pixels.len(),
                });
            }
        }
        let native = self
            .backend
            .create_texture(pixels, width, height, format)
            .map_err(|err| {
                warn!(%handle, error = %err, "texture creation failed");
                ResourceError::from(err)
            })?;
        self.attach(ResourceCategory::Texture, handle, native)
    }

    /// Deleting a texture also clears every unit it is bound to.
    pub fn delete_texture(&mut self, handle: LegacyHandle) {
        if self.release(ResourceCategory::Texture, handle) {
            self.tracker.unbind_texture_everywhere(handle);
        }
    }

    pub fn gen_framebuffer(&mut self) -> LegacyHandle {
        self.registry.allocate(ResourceCategory::Framebuffer)
    }

    /// Attaches color (and optional depth) textures, creating the native framebuffer.
    pub fn framebuffer_texture(
        &mut self,
        framebuffer: LegacyHandle,
        color: LegacyHandle,
        depth: LegacyHandle,
    ) -> Result<(), ResourceError> {
        if !self.registry.is_live(ResourceCategory::Framebuffer, framebuffer) {
            return Err(Self::not_found(ResourceCategory::Framebuffer, framebuffer));
        }
        let Some(color_native) = self.registry.resolve(ResourceCategory::Texture, color) else {
            return Err(Self::not_found(ResourceCategory::Texture, color));
        };
        let depth_native = if depth.is_some() {
            let Some(native) = self.registry.resolve(ResourceCategory::Texture, depth) else {
                return Err(Self::not_found(ResourceCategory::Texture, depth));
            };
            Some(native)
        } else {
            None
        };
        let native = self
            .backend
            .create_framebuffer(color_native, depth_native)
            .map_err(|err| {
                warn!(%framebuffer, error = %err, "framebuffer creation failed");
                ResourceError::from(err)
            })?;
        self.attach(ResourceCategory::Framebuffer, framebuffer, native)
    }

    /// `NONE` selects the default target.
    pub fn bind_framebuffer(&mut self, framebuffer: LegacyHandle) {
        self.tracker.bind_framebuffer(framebuffer);
    }

    pub fn delete_framebuffer(&mut self, framebuffer: LegacyHandle) {
        if self.release(ResourceCategory::Framebuffer, framebuffer)
            && self.tracker.bound_framebuffer() == framebuffer
        {
            self.tracker.bind_framebuffer(LegacyHandle::NONE);
        }
    }

    pub fn gen_program(&mut self) -> LegacyHandle {
        self.registry.allocate(ResourceCategory::Program)
    }

    /// Names the logical shader a program draws with.
    pub fn program_shader(&mut self, program: LegacyHandle, shader_name: &str) -> Result<(), ResourceError> {
        if !self.registry.is_live(ResourceCategory::Program, program) {
            return Err(Self::not_found(ResourceCategory::Program, program));
        }
        self.programs.insert(program, shader_name.to_string());
        Ok(())
    }

    pub fn use_program(&mut self, program: LegacyHandle) {
        self.tracker.use_program(program);
    }

    /// Programs own no native objects; pipelines stay in the cache.
    pub fn delete_program(&mut self, program: LegacyHandle) {
        if self.release(ResourceCategory::Program, program) {
            self.programs.remove(&program);
            if self.tracker.bound_program() == program {
                self.tracker.use_program(LegacyHandle::NONE);
            }
        }
    }

    pub fn set_blend(&mut self, enabled: bool, src: BlendFactor, dst: BlendFactor) {
        self.tracker.set_blend(enabled, src, dst);
    }

    pub fn set_blend_equation(&mut self, equation: BlendEquation) {
        self.tracker.set_blend_equation(equation);
    }

    pub fn set_depth_test(&mut self, enabled: bool, func: CompareFunc) {
        self.tracker.set_depth_test(enabled, func);
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        self.tracker.set_depth_write(enabled);
    }

    pub fn set_cull(&mut self, enabled: bool, face: CullFace) {
        self.tracker.set_cull(enabled, face);
    }

    pub fn set_front_face(&mut self, front_face: FrontFace) {
        self.tracker.set_front_face(front_face);
    }

    pub fn set_scissor(&mut self, enabled: bool, rect: ScissorRect) {
        self.tracker.set_scissor(enabled, rect);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.tracker.set_viewport(viewport);
    }

    pub fn set_color_mask(&mut self, mask: ColorWriteMask) {
        self.tracker.set_color_mask(mask);
    }

    pub fn active_texture(&mut self, unit: u32) {
        self.tracker.set_active_texture_unit(unit);
    }

    /// Binds `texture` to unit `slot`. `NONE` clears the unit.
    pub fn bind_texture(&mut self, slot: u32, texture: LegacyHandle) {
        self.tracker.bind_texture_unit(slot, texture);
    }

    pub fn set_vertex_format(&mut self, desc: &VertexFormatDesc) {
        self.tracker.set_vertex_format(desc);
    }

    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> SupplierId {
        self.suppliers.set_value(name, value)
    }

    pub fn register_uniform_supplier(
        &mut self,
        name: &str,
        supplier: impl Fn(&SupplierContext<'_>) -> Option<UniformValue> + 'static,
    ) -> SupplierId {
        self.suppliers.register_fn(name, supplier)
    }

    /// Constant-buffer layout of the pipeline `program` draws with under the current vertex format.
    /// Builds the pipeline if needed.
    pub fn uniform_layout(&mut self, program: LegacyHandle) -> Result<&UniformBufferLayout, UniformError> {
        self.program_layout(program).map(|layout| &*layout)
    }

    /// Writes raw bytes into a uniform that no supplier feeds. The value persists across draws of
    /// the same pipeline.
    pub fn update_uniform(
        &mut self,
        program: LegacyHandle,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), UniformError> {
        self.program_layout(program)?.update_entry(name, bytes)
    }

    /// Indexed form of [`Self::update_uniform`]; indices come from [`Self::uniform_layout`].
    pub fn update_uniform_at(
        &mut self,
        program: LegacyHandle,
        index: usize,
        bytes: &[u8],
    ) -> Result<(), UniformError> {
        self.program_layout(program)?.update_entry_at(index, bytes)
    }

    fn program_layout(&mut self, program: LegacyHandle) -> Result<&mut UniformBufferLayout, UniformError> {
        let Some(shader_name) = self.programs.get(&program) else {
            warn!(%program, "uniform update on a program without a shader");
            return Err(UniformError::NoPipeline(program));
        };
        let Some(pipeline) = self.pipelines.get_or_create_pipeline(
            &mut self.backend,
            shader_name,
            self.tracker.vertex_caps(),
        ) else {
            return Err(UniformError::NoPipeline(program));
        };
        let layout = self.translator.layout_for(&pipeline, &self.suppliers);
        layout.rebind_if_stale(&self.suppliers);
        Ok(layout)
    }

    pub fn draw(&mut self, call: &DrawCall) -> DrawOutcome {
        let env = DrawEnv {
            registry: &self.registry,
            tracker: &self.tracker,
            suppliers: &self.suppliers,
            programs: &self.programs,
            index_buffers: &self.index_buffers,
        };
        self.translator
            .draw(&mut self.backend, &mut self.pipelines, &env, call)
    }

    /// Resets fixed-function state to defaults and forgets what was applied to the backend.
    pub fn begin_session(&mut self) {
        self.tracker.reset();
        self.translator.reset_applied_state();
    }

    /// Destroys every cached pipeline and constant buffer; they are rebuilt on demand.
    pub fn clear_pipeline_cache(&mut self) {
        let destroyed = self.pipelines.clear(&mut self.backend);
        self.translator.release_all_layouts(&mut self.backend);
        debug!(pipelines = destroyed.len(), "pipeline cache cleared");
    }

    /// Releases every registry entry and cache. Each native object is destroyed exactly once.
    pub fn shutdown(&mut self) {
        self.clear_pipeline_cache();
        for native in self.registry.drain() {
            self.destroy(native);
        }
        self.programs.clear();
        self.buffer_sizes.clear();
        self.index_buffers.clear();
        self.tracker.reset();
        self.translator.reset_applied_state();
        debug!(released = self.resources_released, "legacy context shut down");
    }
}
