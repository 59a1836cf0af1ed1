//! Shader variant selection, WGSL reflection and the pipeline cache.

pub mod pipeline;
pub mod reflect;
pub mod variant;

pub use pipeline::{Pipeline, PipelineBuildError, PipelineId, PipelineManager, PipelineStats};
pub use reflect::{reflect_wgsl, ShaderInterface, ShaderReflectError, UniformDecl};
pub use variant::{ResolvedVariant, VariantDecision, VariantTable, VariantToken};

use hashbrown::HashMap;

/// Asset-loading collaborator: maps a logical path to shader source text.
pub trait ShaderSourceLoader {
    /// `None` is NOT_FOUND.
    fn load_shader_source(&self, logical_path: &str) -> Option<String>;
}

impl<F> ShaderSourceLoader for F
where
    F: Fn(&str) -> Option<String>,
{
    fn load_shader_source(&self, logical_path: &str) -> Option<String> {
        self(logical_path)
    }
}

/// In-memory loader, keyed by logical path.
#[derive(Debug, Default, Clone)]
pub struct MemoryShaderSource {
    sources: HashMap<String, String>,
}

impl MemoryShaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, logical_path: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(logical_path.into(), source.into());
    }

    /// Registers both stages of `variant` under `root` using the standard path scheme.
    pub fn insert_variant(&mut self, root: &str, variant: &str, vertex: &str, fragment: &str) {
        self.insert(vertex_source_path(root, variant), vertex);
        self.insert(fragment_source_path(root, variant), fragment);
    }
}

impl ShaderSourceLoader for MemoryShaderSource {
    fn load_shader_source(&self, logical_path: &str) -> Option<String> {
        self.sources.get(logical_path).cloned()
    }
}

pub fn vertex_source_path(root: &str, variant: &str) -> String {
    format!("{}/{variant}.vert.wgsl", root.trim_end_matches('/'))
}

pub fn fragment_source_path(root: &str, variant: &str) -> String {
    format!("{}/{variant}.frag.wgsl", root.trim_end_matches('/'))
}
