//! Uniform and texture reflection over WGSL sources.

use thiserror::Error;
use tracing::warn;

use crate::uniform::{UniformScalar, UniformType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShaderReflectError {
    #[error("failed to parse WGSL: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformType,
}

/// What a pipeline's shaders declare that the translator has to feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInterface {
    /// Declaration order; names are unique.
    pub uniforms: Vec<UniformDecl>,
    /// Sorted, unique texture binding slots.
    pub texture_slots: Vec<u32>,
    /// Sorted, unique `(group, binding)` pairs of `var<uniform>` globals.
    pub uniform_bindings: Vec<(u32, u32)>,
}

impl ShaderInterface {
    /// Merges another stage's interface. On duplicate uniform names the first declaration wins.
    pub fn merge(&mut self, other: ShaderInterface) {
        for decl in other.uniforms {
            if !self.uniforms.iter().any(|u| u.name == decl.name) {
                self.uniforms.push(decl);
            }
        }
        self.texture_slots.extend(other.texture_slots);
        self.texture_slots.sort_unstable();
        self.texture_slots.dedup();
        self.uniform_bindings.extend(other.uniform_bindings);
        self.uniform_bindings.sort_unstable();
        self.uniform_bindings.dedup();
    }

    /// The constant buffer is a single binding; uniforms spread over several bindings would be
    /// packed into it in declaration order and read back at the wrong offsets.
    pub fn has_split_uniforms(&self) -> bool {
        self.uniform_bindings.len() > 1
    }
}

fn map_scalar(scalar: naga::Scalar) -> Option<UniformScalar> {
    match (scalar.kind, scalar.width) {
        (naga::ScalarKind::Float, 4) => Some(UniformScalar::F32),
        (naga::ScalarKind::Sint, 4) => Some(UniformScalar::I32),
        (naga::ScalarKind::Uint, 4) => Some(UniformScalar::U32),
        _ => None,
    }
}

fn map_type(inner: &naga::TypeInner) -> Option<UniformType> {
    match *inner {
        naga::TypeInner::Scalar(scalar) => map_scalar(scalar).map(UniformType::Scalar),
        naga::TypeInner::Vector { size, scalar } => {
            let scalar = map_scalar(scalar)?;
            Some(match size {
                naga::VectorSize::Bi => UniformType::Vec2(scalar),
                naga::VectorSize::Tri => UniformType::Vec3(scalar),
                naga::VectorSize::Quad => UniformType::Vec4(scalar),
            })
        }
        naga::TypeInner::Matrix {
            columns: naga::VectorSize::Quad,
            rows: naga::VectorSize::Quad,
            scalar,
        } if map_scalar(scalar) == Some(UniformScalar::F32) => Some(UniformType::Mat4),
        _ => None,
    }
}

fn push_uniform(interface: &mut ShaderInterface, name: &str, inner: &naga::TypeInner) {
    match map_type(inner) {
        Some(ty) => {
            if !interface.uniforms.iter().any(|u| u.name == name) {
                interface.uniforms.push(UniformDecl {
                    name: name.to_string(),
                    ty,
                });
            }
        }
        None => warn!(uniform = name, ?inner, "skipping uniform of unsupported type"),
    }
}

/// Collects uniform declarations and texture bindings from one WGSL stage.
///
/// Members of a `var<uniform>` struct become individual entries in member order; a bare
/// `var<uniform>` of a supported type becomes one entry named after the variable. Unsupported types
/// are skipped with a warning.
pub fn reflect_wgsl(source: &str) -> Result<ShaderInterface, ShaderReflectError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| ShaderReflectError::Parse(err.emit_to_string(source)))?;

    let mut interface = ShaderInterface::default();
    for (_, var) in module.global_variables.iter() {
        let inner = &module.types[var.ty].inner;
        match var.space {
            naga::AddressSpace::Uniform => {
                if let Some(binding) = var.binding.as_ref() {
                    interface.uniform_bindings.push((binding.group, binding.binding));
                }
                match inner {
                    naga::TypeInner::Struct { members, .. } => {
                        for member in members {
                            let Some(name) = member.name.as_deref() else {
                                continue;
                            };
                            push_uniform(&mut interface, name, &module.types[member.ty].inner);
                        }
                    }
                    other => {
                        let Some(name) = var.name.as_deref() else {
                            continue;
                        };
                        push_uniform(&mut interface, name, other);
                    }
                }
            }
            naga::AddressSpace::Handle => {
                if let (naga::TypeInner::Image { .. }, Some(binding)) = (inner, var.binding.as_ref()) {
                    interface.texture_slots.push(binding.binding);
                }
            }
            _ => {}
        }
    }
    interface.texture_slots.sort_unstable();
    interface.texture_slots.dedup();
    interface.uniform_bindings.sort_unstable();
    interface.uniform_bindings.dedup();
    Ok(interface)
}
