//! Lazily built, variant-keyed pipeline cache.
//!
//! A request `(name, caps)` is first mapped to a variant key by the [`VariantTable`]; that mapping is
//! memoized so downgrade warnings are logged once. Pipelines are cached by `(variant key, caps)`
//! because the backend derives the input layout from the caps at link time. A slot whose build
//! failed is served by the fallback variant (tried exactly once) or marked unusable, and the outcome
//! is cached until [`PipelineManager::clear`].

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use super::reflect::{reflect_wgsl, ShaderInterface, ShaderReflectError};
use super::variant::{VariantDecision, VariantTable};
use super::{fragment_source_path, vertex_source_path, ShaderSourceLoader};
use crate::backend::{Backend, NativeHandle, PipelineLinkDesc, ShaderStage};
use crate::config::TranslatorConfig;
use crate::error::BackendError;
use crate::uniform::UniformBufferLayout;
use crate::vertex::VertexFormatCaps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u64);

/// A linked, backend-ready shader pair.
#[derive(Debug)]
pub struct Pipeline {
    pub id: PipelineId,
    /// Variant key this pipeline was built from.
    pub name: String,
    pub vertex_shader: NativeHandle,
    pub fragment_shader: NativeHandle,
    pub pipeline: NativeHandle,
    /// Vertex capabilities the pipeline was linked for.
    pub vertex_caps: VertexFormatCaps,
    pub interface: ShaderInterface,
}

#[derive(Debug, Error)]
pub enum PipelineBuildError {
    #[error("shader source {0:?} not found")]
    MissingSource(String),
    #[error(transparent)]
    Reflect(#[from] ShaderReflectError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug)]
enum PipelineSlot {
    Ready(Arc<Pipeline>),
    /// Build and fallback both failed; draws are skipped.
    Unusable,
}

/// Snapshot of pipeline cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub fallbacks: u64,
    pub unusable: u64,
    pub downgrades: u64,
}

pub struct PipelineManager {
    loader: Box<dyn ShaderSourceLoader>,
    shader_root: String,
    fallback_variant: String,
    variants: VariantTable,
    resolutions: HashMap<(String, VertexFormatCaps), String>,
    slots: HashMap<(String, VertexFormatCaps), PipelineSlot>,
    next_id: u64,
    stats: PipelineStats,
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("shader_root", &self.shader_root)
            .field("fallback_variant", &self.fallback_variant)
            .field("slots", &self.slots.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl PipelineManager {
    pub fn new(loader: Box<dyn ShaderSourceLoader>, config: &TranslatorConfig) -> Self {
        Self {
            loader,
            shader_root: config.shader_root.clone(),
            fallback_variant: config.fallback_variant.clone(),
            variants: config.variants.clone(),
            resolutions: HashMap::new(),
            slots: HashMap::new(),
            next_id: 0,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn fallback_variant(&self) -> &str {
        &self.fallback_variant
    }

    /// Number of distinct live pipelines.
    pub fn pipeline_count(&self) -> usize {
        self.ready_pipelines().len()
    }

    fn ready_pipelines(&self) -> Vec<Arc<Pipeline>> {
        let mut seen = HashSet::new();
        self.slots
            .values()
            .filter_map(|slot| match slot {
                PipelineSlot::Ready(p) if seen.insert(p.id) => Some(Arc::clone(p)),
                _ => None,
            })
            .collect()
    }

    /// Maps a request to its variant key, memoized per `(name, caps)`.
    pub fn resolve_variant(&mut self, name: &str, caps: VertexFormatCaps) -> String {
        if let Some(key) = self.resolutions.get(&(name.to_string(), caps)) {
            return key.clone();
        }
        let resolved = self.variants.resolve(name, caps);
        match &resolved.decision {
            VariantDecision::Downgraded { dropped } => {
                self.stats.downgrades += 1;
                warn!(
                    requested = name,
                    variant = %resolved.key,
                    ?dropped,
                    ?caps,
                    "vertex format lacks attributes the shader name implies; downgrading variant"
                );
            }
            decision => {
                debug!(requested = name, variant = %resolved.key, ?decision, ?caps, "resolved shader variant");
            }
        }
        self.resolutions
            .insert((name.to_string(), caps), resolved.key.clone());
        resolved.key
    }

    /// Whether the variant key is cached as unusable for these caps.
    pub fn is_unusable(&self, key: &str, caps: VertexFormatCaps) -> bool {
        matches!(
            self.slots.get(&(key.to_string(), caps)),
            Some(PipelineSlot::Unusable)
        )
    }

    pub fn cached(&self, key: &str, caps: VertexFormatCaps) -> Option<Arc<Pipeline>> {
        match self.slots.get(&(key.to_string(), caps)) {
            Some(PipelineSlot::Ready(p)) => Some(Arc::clone(p)),
            _ => None,
        }
    }

    /// Returns the pipeline for `(name, caps)`, building it on first request.
    ///
    /// `None` is the "no pipeline" sentinel: the build and its single fallback attempt both failed.
    /// Callers skip the draw.
    pub fn get_or_create_pipeline(
        &mut self,
        backend: &mut dyn Backend,
        name: &str,
        caps: VertexFormatCaps,
    ) -> Option<Arc<Pipeline>> {
        let key = self.resolve_variant(name, caps);
        if let Some(slot) = self.slots.get(&(key.clone(), caps)) {
            self.stats.hits += 1;
            return match slot {
                PipelineSlot::Ready(p) => Some(Arc::clone(p)),
                PipelineSlot::Unusable => None,
            };
        }
        self.stats.misses += 1;

        let result = match self.build(backend, &key, caps) {
            Ok(pipeline) => Some(pipeline),
            Err(err) => {
                warn!(variant = %key, requested = name, error = %err, "pipeline build failed");
                self.fallback_for(backend, &key, caps)
            }
        };
        let slot = match &result {
            Some(pipeline) => PipelineSlot::Ready(Arc::clone(pipeline)),
            None => {
                self.stats.unusable += 1;
                warn!(variant = %key, "pipeline marked unusable; draws using it will be skipped");
                PipelineSlot::Unusable
            }
        };
        self.slots.insert((key, caps), slot);
        result
    }

    fn fallback_for(
        &mut self,
        backend: &mut dyn Backend,
        key: &str,
        caps: VertexFormatCaps,
    ) -> Option<Arc<Pipeline>> {
        if key == self.fallback_variant {
            return None;
        }
        let fallback = self.fallback_variant.clone();
        match self.slots.get(&(fallback.clone(), caps)) {
            Some(PipelineSlot::Ready(p)) => {
                self.stats.fallbacks += 1;
                return Some(Arc::clone(p));
            }
            Some(PipelineSlot::Unusable) => return None,
            None => {}
        }
        match self.build(backend, &fallback, caps) {
            Ok(pipeline) => {
                self.stats.fallbacks += 1;
                debug!(variant = key, fallback = %fallback, "using fallback pipeline");
                self.slots
                    .insert((fallback, caps), PipelineSlot::Ready(Arc::clone(&pipeline)));
                Some(pipeline)
            }
            Err(err) => {
                warn!(variant = key, fallback = %fallback, error = %err, "fallback pipeline build failed");
                self.stats.unusable += 1;
                self.slots.insert((fallback, caps), PipelineSlot::Unusable);
                None
            }
        }
    }

    fn load(&self, path: String) -> Result<String, PipelineBuildError> {
        self.loader
            .load_shader_source(&path)
            .ok_or(PipelineBuildError::MissingSource(path))
    }

    fn build(
        &mut self,
        backend: &mut dyn Backend,
        key: &str,
        caps: VertexFormatCaps,
    ) -> Result<Arc<Pipeline>, PipelineBuildError> {
        let vs_source = self.load(vertex_source_path(&self.shader_root, key))?;
        let fs_source = self.load(fragment_source_path(&self.shader_root, key))?;

        let mut interface = reflect_wgsl(&vs_source)?;
        interface.merge(reflect_wgsl(&fs_source)?);
        if interface.has_split_uniforms() {
            warn!(
                variant = key,
                bindings = ?interface.uniform_bindings,
                "uniforms span several bindings but are uploaded as one constant buffer at binding 0"
            );
        }

        let vertex_shader = backend.compile_shader_stage(&vs_source, ShaderStage::Vertex)?;
        let fragment_shader = match backend.compile_shader_stage(&fs_source, ShaderStage::Fragment) {
            Ok(handle) => handle,
            Err(err) => {
                backend.destroy_resource(vertex_shader);
                return Err(err.into());
            }
        };

        let uniform_buffer_size = UniformBufferLayout::from_decls(key, &interface.uniforms).size();
        let desc = PipelineLinkDesc {
            label: key,
            vertex_shader,
            fragment_shader,
            vertex_caps: caps,
            uniform_buffer_size,
            texture_slots: &interface.texture_slots,
        };
        let pipeline = match backend.link_pipeline(&desc) {
            Ok(handle) => handle,
            Err(err) => {
                backend.destroy_resource(vertex_shader);
                backend.destroy_resource(fragment_shader);
                return Err(err.into());
            }
        };

        self.next_id += 1;
        self.stats.builds += 1;
        debug!(
            variant = key,
            ?caps,
            %pipeline,
            uniforms = interface.uniforms.len(),
            textures = interface.texture_slots.len(),
            "built pipeline"
        );
        Ok(Arc::new(Pipeline {
            id: PipelineId(self.next_id),
            name: key.to_string(),
            vertex_shader,
            fragment_shader,
            pipeline,
            vertex_caps: caps,
            interface,
        }))
    }

    /// Destroys every cached pipeline (each native object exactly once) and forgets all variant
    /// resolutions. Returns the ids of the destroyed pipelines.
    pub fn clear(&mut self, backend: &mut dyn Backend) -> Vec<PipelineId> {
        let pipelines = self.ready_pipelines();
        for pipeline in &pipelines {
            backend.destroy_resource(pipeline.pipeline);
            backend.destroy_resource(pipeline.vertex_shader);
            backend.destroy_resource(pipeline.fragment_shader);
        }
        self.slots.clear();
        self.resolutions.clear();
        debug!(destroyed = pipelines.len(), "cleared pipeline cache");
        pipelines.iter().map(|p| p.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{BackendCommand, RecordingBackend};
    use crate::shader::MemoryShaderSource;

    const VS: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }";
    const FS: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

    fn manager(variants: &[&str]) -> PipelineManager {
        let config = TranslatorConfig::default();
        let mut sources = MemoryShaderSource::new();
        for variant in variants {
            sources.insert_variant(&config.shader_root, variant, VS, FS);
        }
        PipelineManager::new(Box::new(sources), &config)
    }

    #[test]
    fn identical_requests_share_one_pipeline() {
        let mut backend = RecordingBackend::new();
        let mut pipelines = manager(&["position_tex"]);
        let a = pipelines
            .get_or_create_pipeline(&mut backend, "position", VertexFormatCaps::UV0)
            .unwrap();
        let b = pipelines
            .get_or_create_pipeline(&mut backend, "position", VertexFormatCaps::UV0)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name, "position_tex");
        let stats = pipelines.stats();
        assert_eq!((stats.hits, stats.misses, stats.builds), (1, 1, 1));
    }

    #[test]
    fn missing_variant_uses_fallback_once() {
        let mut backend = RecordingBackend::new();
        let mut pipelines = manager(&["position_tex_color"]);
        let p = pipelines
            .get_or_create_pipeline(&mut backend, "particle", VertexFormatCaps::empty())
            .unwrap();
        assert_eq!(p.name, "position_tex_color");
        let again = pipelines
            .get_or_create_pipeline(&mut backend, "particle", VertexFormatCaps::empty())
            .unwrap();
        assert!(Arc::ptr_eq(&p, &again));
        assert_eq!(pipelines.stats().fallbacks, 1);
        assert_eq!(pipelines.pipeline_count(), 1);
    }

    #[test]
    fn failed_fallback_marks_unusable() {
        let mut backend = RecordingBackend::new();
        let mut pipelines = manager(&[]);
        assert!(pipelines
            .get_or_create_pipeline(&mut backend, "particle", VertexFormatCaps::empty())
            .is_none());
        assert!(pipelines.is_unusable("particle", VertexFormatCaps::empty()));
        assert!(pipelines.is_unusable("position_tex_color", VertexFormatCaps::empty()));
        // Cached: no further attempts.
        assert!(pipelines
            .get_or_create_pipeline(&mut backend, "particle", VertexFormatCaps::empty())
            .is_none());
        assert_eq!(pipelines.stats().misses, 1);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn link_failure_releases_compiled_stages() {
        let mut backend = RecordingBackend::new();
        backend.fail_link_for("position_tex");
        backend.fail_link_for("position_tex_color");
        let mut pipelines = manager(&["position_tex", "position_tex_color"]);
        assert!(pipelines
            .get_or_create_pipeline(&mut backend, "position_tex", VertexFormatCaps::UV0)
            .is_none());
        assert_eq!(backend.live_count(), 0);
        assert_eq!(backend.invalid_destroys(), 0);
    }

    #[test]
    fn clear_destroys_each_native_once() {
        let mut backend = RecordingBackend::new();
        let mut pipelines = manager(&["position_tex_color"]);
        pipelines.get_or_create_pipeline(&mut backend, "a", VertexFormatCaps::empty());
        pipelines.get_or_create_pipeline(&mut backend, "b", VertexFormatCaps::empty());
        pipelines.get_or_create_pipeline(&mut backend, "position_tex_color", VertexFormatCaps::UV0);
        // "a" and "b" share the fallback built for empty caps; UV0 links its own.
        let destroyed = pipelines.clear(&mut backend);
        assert_eq!(destroyed.len(), 2);
        assert_eq!(
            backend.count(|c| matches!(c, BackendCommand::Destroy(_))),
            6,
            "pipeline plus two stages, twice"
        );
        assert_eq!(backend.live_count(), 0);
        assert_eq!(pipelines.pipeline_count(), 0);
    }

    #[test]
    fn same_variant_with_other_caps_links_again() {
        let mut backend = RecordingBackend::new();
        let mut pipelines = manager(&["rendertype_solid"]);
        let a = pipelines
            .get_or_create_pipeline(
                &mut backend,
                "rendertype_solid",
                VertexFormatCaps::POSITION | VertexFormatCaps::UV0,
            )
            .unwrap();
        let caps = VertexFormatCaps::POSITION | VertexFormatCaps::COLOR | VertexFormatCaps::NORMAL;
        let b = pipelines
            .get_or_create_pipeline(&mut backend, "rendertype_solid", caps)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.name, b.name);
        assert_eq!(b.vertex_caps, caps);
        assert_eq!(
            backend.count(|c| matches!(c, BackendCommand::LinkPipeline { .. })),
            2
        );
        assert_eq!(pipelines.pipeline_count(), 2);
    }
}
