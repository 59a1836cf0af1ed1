//! `aero-gl-compat` translates a legacy, fixed-function, immediate-mode command stream into the
//! explicit pipeline model exposed by a [`Backend`].
//!
//! The crate is organized leaf-first:
//! - [`registry`]: sequential legacy handles mapped to opaque native handles.
//! - [`vertex`]: reduction of vertex layouts to a [`VertexFormatCaps`] bitmask.
//! - [`state`]: the fixed-function mirror ([`LegacyStateTracker`]) and legacy → backend enum translation.
//! - [`shader`]: variant selection, WGSL reflection and the [`PipelineManager`] cache.
//! - [`uniform`]: constant-buffer layouts with pull-based value suppliers.
//! - [`draw`]: the [`DrawTranslator`] that enforces the backend binding order.
//! - [`context`]: the legacy-style client API ([`LegacyContext`]) tying everything together.
//!
//! All components assume a single render thread; none of them are internally synchronized.

pub mod backend;
pub mod config;
pub mod context;
pub mod draw;
pub mod error;
pub mod registry;
pub mod shader;
pub mod state;
pub mod stats;
pub mod uniform;
pub mod vertex;

mod warn_limit;

pub use backend::{Backend, NativeHandle};
pub use config::TranslatorConfig;
pub use context::{BufferTarget, LegacyContext};
pub use draw::{DrawCall, DrawOutcome, DrawTranslator, SkipReason};
pub use error::{BackendError, InitError, ResourceError, UniformError};
pub use registry::{LegacyHandle, ResourceCategory, ResourceRegistry};
pub use shader::{Pipeline, PipelineManager, ShaderSourceLoader};
pub use state::LegacyStateTracker;
pub use stats::TranslatorStats;
pub use uniform::{UniformBufferLayout, UniformSuppliers, UniformValue};
pub use vertex::{analyze, VertexFormatCaps, VertexFormatDesc};
