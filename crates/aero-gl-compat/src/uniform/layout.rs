use std::fmt;

use tracing::{debug, warn};

use super::supplier::{SupplierContext, SupplierId, UniformSuppliers};
use super::{align_up, UNIFORM_BUFFER_ALIGNMENT};
use crate::backend::{Backend, BufferKind, NativeHandle};
use crate::error::UniformError;
use crate::shader::{Pipeline, UniformDecl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformScalar {
    F32,
    I32,
    U32,
}

/// Uniform types a layout can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Scalar(UniformScalar),
    Vec2(UniformScalar),
    Vec3(UniformScalar),
    Vec4(UniformScalar),
    /// `mat4x4<f32>`.
    Mat4,
}

impl UniformType {
    pub const fn size(self) -> u64 {
        match self {
            UniformType::Scalar(_) => 4,
            UniformType::Vec2(_) => 8,
            UniformType::Vec3(_) => 12,
            UniformType::Vec4(_) => 16,
            UniformType::Mat4 => 64,
        }
    }

    pub const fn align(self) -> u64 {
        match self {
            UniformType::Scalar(_) => 4,
            UniformType::Vec2(_) => 8,
            UniformType::Vec3(_) | UniformType::Vec4(_) | UniformType::Mat4 => 16,
        }
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scalar = |s: &UniformScalar| match s {
            UniformScalar::F32 => "f32",
            UniformScalar::I32 => "i32",
            UniformScalar::U32 => "u32",
        };
        match self {
            UniformType::Scalar(s) => f.write_str(scalar(s)),
            UniformType::Vec2(s) => write!(f, "vec2<{}>", scalar(s)),
            UniformType::Vec3(s) => write!(f, "vec3<{}>", scalar(s)),
            UniformType::Vec4(s) => write!(f, "vec4<{}>", scalar(s)),
            UniformType::Mat4 => f.write_str("mat4x4<f32>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformEntry {
    pub name: String,
    pub ty: UniformType,
    pub offset: u64,
    pub size: u64,
}

impl UniformEntry {
    fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..(self.offset + self.size) as usize
    }
}

/// CPU image of one pipeline's constant buffer plus the backend buffer it uploads to.
#[derive(Debug)]
pub struct UniformBufferLayout {
    label: String,
    entries: Vec<UniformEntry>,
    size: u64,
    data: Vec<u8>,
    dirty: bool,
    buffer: Option<NativeHandle>,
    bindings: Vec<Option<SupplierId>>,
    bound_generation: Option<u64>,
    mismatch_logged: Vec<bool>,
    uploads: u64,
}

/// Builds the constant-buffer layout for a pipeline and binds its entries to suppliers.
///
/// Declared uniforms without a supplier stay zero-filled; each is warned about once here.
pub fn build_layout(pipeline: &Pipeline, suppliers: &UniformSuppliers) -> UniformBufferLayout {
    let mut layout = UniformBufferLayout::from_decls(&pipeline.name, &pipeline.interface.uniforms);
    layout.rebind(suppliers);
    for (entry, binding) in layout.entries.iter().zip(&layout.bindings) {
        if binding.is_none() {
            warn!(
                pipeline = %layout.label,
                uniform = %entry.name,
                ty = %entry.ty,
                "declared uniform has no supplier; zero-filling"
            );
        }
    }
    debug!(
        pipeline = %layout.label,
        entries = layout.entries.len(),
        size = layout.size,
        "built uniform layout"
    );
    layout
}

impl UniformBufferLayout {
    /// Assigns offsets in declaration order with natural alignment and pads the total to 16 bytes.
    pub fn from_decls(label: &str, decls: &[UniformDecl]) -> Self {
        let mut cursor = 0u64;
        let entries: Vec<UniformEntry> = decls
            .iter()
            .map(|decl| {
                let offset = align_up(cursor, decl.ty.align());
                cursor = offset + decl.ty.size();
                UniformEntry {
                    name: decl.name.clone(),
                    ty: decl.ty,
                    offset,
                    size: decl.ty.size(),
                }
            })
            .collect();
        let size = align_up(cursor, UNIFORM_BUFFER_ALIGNMENT);
        let count = entries.len();
        Self {
            label: label.to_string(),
            entries,
            size,
            data: vec![0; size as usize],
            dirty: true,
            buffer: None,
            bindings: vec![None; count],
            bound_generation: None,
            mismatch_logged: vec![false; count],
            uploads: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entries(&self) -> &[UniformEntry] {
        &self.entries
    }

    /// Total size in bytes; always a multiple of 16.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn buffer(&self) -> Option<NativeHandle> {
        self.buffer
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    pub fn is_supplied(&self, index: usize) -> bool {
        matches!(self.bindings.get(index), Some(Some(_)))
    }

    /// Resolves every entry name to a supplier index.
    pub fn rebind(&mut self, suppliers: &UniformSuppliers) {
        for (binding, entry) in self.bindings.iter_mut().zip(&self.entries) {
            *binding = suppliers.lookup(&entry.name);
        }
        self.bound_generation = Some(suppliers.generation());
    }

    /// Rebinds when suppliers were registered or replaced since the last bind.
    pub fn rebind_if_stale(&mut self, suppliers: &UniformSuppliers) {
        if self.bound_generation != Some(suppliers.generation()) {
            self.rebind(suppliers);
        }
    }

    /// Pulls every supplier into the CPU image. Marks the buffer dirty only if some byte changed.
    pub fn refresh(&mut self, suppliers: &UniformSuppliers, cx: &SupplierContext<'_>) -> bool {
        self.rebind_if_stale(suppliers);
        let mut changed = false;
        for (index, entry) in self.entries.iter().enumerate() {
            let Some(id) = self.bindings[index] else {
                continue;
            };
            let Some(value) = suppliers.supply(id, cx) else {
                continue;
            };
            if value.uniform_type() != entry.ty {
                if !self.mismatch_logged[index] {
                    self.mismatch_logged[index] = true;
                    warn!(
                        pipeline = %self.label,
                        uniform = %entry.name,
                        expected = %entry.ty,
                        actual = %value.uniform_type(),
                        "uniform value type does not match declaration; leaving entry unchanged"
                    );
                }
                continue;
            }
            let dst = &mut self.data[entry.range()];
            let src = value.as_bytes();
            if dst != src {
                dst.copy_from_slice(src);
                changed = true;
            }
        }
        if changed {
            self.dirty = true;
        }
        changed
    }

    /// Overwrites an unsupplied entry's bytes and marks the buffer dirty.
    ///
    /// Entries bound to a supplier are rejected since [`Self::refresh`] would overwrite them. The
    /// bindings checked are those of the last bind; call [`Self::rebind_if_stale`] first.
    pub fn update_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), UniformError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| UniformError::UnknownEntry(name.to_string()))?;
        self.update_entry_at(index, bytes)
    }

    pub fn update_entry_at(&mut self, index: usize, bytes: &[u8]) -> Result<(), UniformError> {
        let entry = self.entries.get(index).ok_or(UniformError::UnknownIndex(index))?;
        if self.is_supplied(index) {
            return Err(UniformError::SupplierBound(entry.name.clone()));
        }
        if bytes.len() as u64 != entry.size {
            return Err(UniformError::SizeMismatch {
                name: entry.name.clone(),
                expected: entry.size as usize,
                actual: bytes.len(),
            });
        }
        let range = entry.range();
        self.data[range].copy_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }

    /// Uploads the full buffer if dirty. Returns whether an upload happened.
    ///
    /// The backend buffer is created on first use. A failed upload leaves the layout dirty so the
    /// next draw retries.
    pub fn flush_if_dirty(&mut self, backend: &mut dyn Backend) -> bool {
        if !self.dirty {
            return false;
        }
        if self.size == 0 {
            self.dirty = false;
            return false;
        }
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => match backend.create_buffer(&self.data, BufferKind::Uniform) {
                Ok(buffer) => {
                    self.buffer = Some(buffer);
                    buffer
                }
                Err(err) => {
                    warn!(pipeline = %self.label, error = %err, "failed to create constant buffer");
                    return false;
                }
            },
        };
        if let Err(err) = backend.upload_constant_buffer(buffer, &self.data) {
            warn!(pipeline = %self.label, error = %err, "constant buffer upload failed");
            return false;
        }
        self.dirty = false;
        self.uploads += 1;
        true
    }

    /// Destroys the backend buffer, if any. The CPU image is kept and marked dirty.
    pub fn release(&mut self, backend: &mut dyn Backend) {
        if let Some(buffer) = self.buffer.take() {
            backend.destroy_resource(buffer);
        }
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{BackendCommand, FailOp, RecordingBackend};
    use crate::state::LegacyStateTracker;
    use crate::uniform::UniformValue;

    fn decl(name: &str, ty: UniformType) -> UniformDecl {
        UniformDecl {
            name: name.to_string(),
            ty,
        }
    }

    #[test]
    fn offsets_follow_natural_alignment() {
        let layout = UniformBufferLayout::from_decls(
            "test",
            &[
                decl("a", UniformType::Scalar(UniformScalar::F32)),
                decl("b", UniformType::Vec2(UniformScalar::F32)),
                decl("c", UniformType::Vec3(UniformScalar::F32)),
                decl("d", UniformType::Scalar(UniformScalar::I32)),
                decl("m", UniformType::Mat4),
            ],
        );
        let offsets: Vec<u64> = layout.entries().iter().map(|e| e.offset).collect();
        // vec3 leaves a 4-byte hole that the following scalar fills.
        assert_eq!(offsets, vec![0, 8, 16, 28, 32]);
        assert_eq!(layout.size(), 96);
    }

    #[test]
    fn total_size_is_padded_to_16() {
        let layout =
            UniformBufferLayout::from_decls("test", &[decl("a", UniformType::Scalar(UniformScalar::F32))]);
        assert_eq!(layout.size(), 16);
        let empty = UniformBufferLayout::from_decls("empty", &[]);
        assert_eq!(empty.size(), 0);
    }

    #[test]
    fn update_entry_checks_name_and_size() {
        let mut layout =
            UniformBufferLayout::from_decls("test", &[decl("a", UniformType::Vec2(UniformScalar::F32))]);
        assert_eq!(
            layout.update_entry("missing", &[0; 8]),
            Err(UniformError::UnknownEntry("missing".into()))
        );
        assert_eq!(
            layout.update_entry("a", &[0; 4]),
            Err(UniformError::SizeMismatch {
                name: "a".into(),
                expected: 8,
                actual: 4
            })
        );
        assert_eq!(layout.update_entry_at(3, &[0; 8]), Err(UniformError::UnknownIndex(3)));
        layout.update_entry("a", bytemuck::bytes_of(&[1.0f32, 2.0])).unwrap();
        assert_eq!(&layout.data()[0..8], bytemuck::bytes_of(&[1.0f32, 2.0]));
    }

    #[test]
    fn supplied_entries_reject_direct_updates() {
        let mut suppliers = UniformSuppliers::new();
        let mut layout = UniformBufferLayout::from_decls(
            "test",
            &[
                decl("Tint", UniformType::Vec4(UniformScalar::F32)),
                decl("Scale", UniformType::Scalar(UniformScalar::F32)),
            ],
        );
        layout.rebind(&suppliers);
        layout.update_entry("Tint", &[0; 16]).unwrap();

        // Registered after the last bind: only visible once rebound.
        suppliers.set_value("Tint", UniformValue::Vec4([1.0; 4]));
        layout.rebind_if_stale(&suppliers);
        assert_eq!(
            layout.update_entry("Tint", &[0; 16]),
            Err(UniformError::SupplierBound("Tint".into()))
        );
        layout
            .update_entry_at(1, bytemuck::bytes_of(&2.0f32))
            .unwrap();
        assert_eq!(&layout.data()[16..20], bytemuck::bytes_of(&2.0f32));

        let tracker = LegacyStateTracker::new(1);
        let cx = SupplierContext {
            state: tracker.snapshot(),
        };
        layout.refresh(&suppliers, &cx);
        assert_eq!(&layout.data()[0..16], bytemuck::bytes_of(&[1.0f32; 4]));
        assert_eq!(&layout.data()[16..20], bytemuck::bytes_of(&2.0f32));
    }

    #[test]
    fn refresh_only_dirties_on_change() {
        let mut suppliers = UniformSuppliers::new();
        let mut layout =
            UniformBufferLayout::from_decls("test", &[decl("Tint", UniformType::Vec4(UniformScalar::F32))]);
        let mut backend = RecordingBackend::new();
        let tracker = LegacyStateTracker::new(1);
        let cx = SupplierContext {
            state: tracker.snapshot(),
        };

        suppliers.set_value("Tint", UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));
        assert!(layout.refresh(&suppliers, &cx));
        assert!(layout.flush_if_dirty(&mut backend));
        assert!(!layout.refresh(&suppliers, &cx));
        assert!(!layout.flush_if_dirty(&mut backend));

        // Several intervening sets; only the latest is uploaded.
        suppliers.set_value("Tint", UniformValue::Vec4([0.0, 1.0, 0.0, 1.0]));
        suppliers.set_value("Tint", UniformValue::Vec4([0.0, 0.0, 1.0, 1.0]));
        assert!(layout.refresh(&suppliers, &cx));
        assert!(layout.flush_if_dirty(&mut backend));
        let buffer = layout.buffer().unwrap();
        assert_eq!(
            backend.buffer_contents(buffer),
            Some(bytemuck::bytes_of(&[0.0f32, 0.0, 1.0, 1.0]))
        );
        assert_eq!(layout.uploads(), 2);
    }

    #[test]
    fn unsigned_vector_values_fill_u32_entries() {
        let mut suppliers = UniformSuppliers::new();
        let mut layout =
            UniformBufferLayout::from_decls("test", &[decl("Flags", UniformType::Vec4(UniformScalar::U32))]);
        let tracker = LegacyStateTracker::new(1);
        let cx = SupplierContext {
            state: tracker.snapshot(),
        };
        suppliers.set_value("Flags", UniformValue::UVec4([1, 2, 3, 4]));
        assert!(layout.refresh(&suppliers, &cx));
        assert_eq!(layout.data(), bytemuck::bytes_of(&[1u32, 2, 3, 4]));
    }

    #[test]
    fn type_mismatch_leaves_entry_unchanged() {
        let mut suppliers = UniformSuppliers::new();
        let mut layout =
            UniformBufferLayout::from_decls("test", &[decl("Fog", UniformType::Scalar(UniformScalar::F32))]);
        let tracker = LegacyStateTracker::new(1);
        let cx = SupplierContext {
            state: tracker.snapshot(),
        };
        suppliers.set_value("Fog", UniformValue::Int(7));
        assert!(!layout.refresh(&suppliers, &cx));
        assert_eq!(layout.data(), &[0u8; 16][..]);
    }

    #[test]
    fn failed_upload_stays_dirty() {
        let mut layout =
            UniformBufferLayout::from_decls("test", &[decl("a", UniformType::Scalar(UniformScalar::U32))]);
        let mut backend = RecordingBackend::new();
        backend.fail_next(FailOp::UploadConstantBuffer);
        assert!(!layout.flush_if_dirty(&mut backend));
        assert!(layout.is_dirty());
        assert!(layout.flush_if_dirty(&mut backend));
        assert_eq!(
            backend.count(|c| matches!(c, BackendCommand::UploadConstantBuffer { .. })),
            1
        );
    }
}
