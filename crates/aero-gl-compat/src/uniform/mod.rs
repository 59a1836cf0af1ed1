//! Per-pipeline constant-buffer layouts fed by pull-based value suppliers.
//!
//! A layout is built once per pipeline from the uniforms its shaders declare. Each entry is bound
//! to a supplier by name at build time; after that the hot path addresses entries and suppliers by
//! index only. At draw time [`UniformBufferLayout::refresh`] pulls every supplier and
//! [`UniformBufferLayout::flush_if_dirty`] uploads the buffer when any byte changed.

mod layout;
mod supplier;

pub use layout::{build_layout, UniformBufferLayout, UniformEntry, UniformScalar, UniformType};
pub use supplier::{
    Supplier, SupplierContext, SupplierId, UniformSuppliers, UniformValue, SCREEN_SIZE_UNIFORM,
};

/// Constant buffers are sized in multiples of this many bytes.
pub const UNIFORM_BUFFER_ALIGNMENT: u64 = 16;

pub(crate) const fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}
