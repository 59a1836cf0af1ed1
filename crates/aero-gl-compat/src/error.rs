use thiserror::Error;

use crate::backend::{NativeHandle, ShaderStage};
use crate::registry::{LegacyHandle, ResourceCategory};

/// Failure reported by a [`crate::Backend`] call.
///
/// Backend failures are always recovered at the translation boundary; they never abort the
/// render loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{stage:?} shader compilation failed: {message}")]
    CompileFailed { stage: ShaderStage, message: String },
    #[error("pipeline link failed: {0}")]
    LinkFailed(String),
    #[error("native graphics backend unavailable: {0}")]
    Unavailable(String),
    #[error("unknown native handle {0}")]
    UnknownHandle(NativeHandle),
    #[error("backend call {op} failed: {message}")]
    Call { op: &'static str, message: String },
}

/// Hard failures surfaced while constructing a [`crate::LegacyContext`].
///
/// This is the only error type that is allowed to escape the layer, and only at startup.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("graphics backend failed to initialize")]
    BackendUnavailable(#[source] BackendError),
    #[error("invalid translator configuration: {0}")]
    InvalidConfig(String),
}

/// Client resource call that could not be applied.
///
/// These are logged where they occur; returning them is informational and callers may ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("{category:?} handle {handle} does not resolve")]
    NotFound {
        category: ResourceCategory,
        handle: LegacyHandle,
    },
    #[error("buffer handle {0} is not an index buffer")]
    NotAnIndexBuffer(LegacyHandle),
    #[error("texture upload expects {expected} bytes but got {actual}")]
    TextureSizeMismatch { expected: usize, actual: usize },
    #[error("update of {len} bytes at offset {offset} exceeds buffer {handle} of {size} bytes")]
    OutOfRange {
        handle: LegacyHandle,
        offset: u64,
        len: usize,
        size: usize,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniformError {
    #[error("uniform layout has no entry named {0:?}")]
    UnknownEntry(String),
    #[error("uniform layout has no entry at index {0}")]
    UnknownIndex(usize),
    #[error("uniform {name:?} is {expected} bytes but the update provides {actual}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("uniform {0:?} is fed by a supplier and refreshed on every draw")]
    SupplierBound(String),
    #[error("program {0} has no usable pipeline")]
    NoPipeline(LegacyHandle),
}
