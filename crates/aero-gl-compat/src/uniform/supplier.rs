use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use super::{UniformScalar, UniformType};
use crate::state::LegacyStateSnapshot;

/// Built-in supplier name for the viewport size as `vec2<f32>`.
pub const SCREEN_SIZE_UNIFORM: &str = "ScreenSize";

/// A value a client can assign to a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Uint(u32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    UVec2([u32; 2]),
    UVec3([u32; 3]),
    UVec4([u32; 4]),
    /// Column-major 4x4 matrix.
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn uniform_type(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Scalar(UniformScalar::F32),
            UniformValue::Int(_) => UniformType::Scalar(UniformScalar::I32),
            UniformValue::Uint(_) => UniformType::Scalar(UniformScalar::U32),
            UniformValue::Vec2(_) => UniformType::Vec2(UniformScalar::F32),
            UniformValue::Vec3(_) => UniformType::Vec3(UniformScalar::F32),
            UniformValue::Vec4(_) => UniformType::Vec4(UniformScalar::F32),
            UniformValue::IVec2(_) => UniformType::Vec2(UniformScalar::I32),
            UniformValue::IVec3(_) => UniformType::Vec3(UniformScalar::I32),
            UniformValue::IVec4(_) => UniformType::Vec4(UniformScalar::I32),
            UniformValue::UVec2(_) => UniformType::Vec2(UniformScalar::U32),
            UniformValue::UVec3(_) => UniformType::Vec3(UniformScalar::U32),
            UniformValue::UVec4(_) => UniformType::Vec4(UniformScalar::U32),
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Raw little-endian bytes as they appear in the constant buffer.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v),
            UniformValue::Int(v) => bytemuck::bytes_of(v),
            UniformValue::Uint(v) => bytemuck::bytes_of(v),
            UniformValue::Vec2(v) => bytemuck::bytes_of(v),
            UniformValue::Vec3(v) => bytemuck::bytes_of(v),
            UniformValue::Vec4(v) => bytemuck::bytes_of(v),
            UniformValue::IVec2(v) => bytemuck::bytes_of(v),
            UniformValue::IVec3(v) => bytemuck::bytes_of(v),
            UniformValue::IVec4(v) => bytemuck::bytes_of(v),
            UniformValue::UVec2(v) => bytemuck::bytes_of(v),
            UniformValue::UVec3(v) => bytemuck::bytes_of(v),
            UniformValue::UVec4(v) => bytemuck::bytes_of(v),
            UniformValue::Mat4(v) => bytemuck::bytes_of(v),
        }
    }
}

/// Read-only view handed to suppliers at refresh time.
#[derive(Clone, Copy)]
pub struct SupplierContext<'a> {
    pub state: &'a LegacyStateSnapshot,
}

type SupplierFn = dyn Fn(&SupplierContext<'_>) -> Option<UniformValue>;

#[derive(Clone)]
pub enum Supplier {
    /// Viewport width and height.
    ScreenSize,
    /// Latest value assigned through [`UniformSuppliers::set_value`].
    Stored,
    Custom(Arc<SupplierFn>),
}

impl fmt::Debug for Supplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Supplier::ScreenSize => f.write_str("ScreenSize"),
            Supplier::Stored => f.write_str("Stored"),
            Supplier::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Index of a registered supplier. Stable for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SupplierId(pub(crate) usize);

#[derive(Debug)]
struct SupplierSlot {
    name: String,
    supplier: Supplier,
    stored: Option<UniformValue>,
}

/// Name → supplier registry shared by every layout.
///
/// The generation counter increases whenever the set of names or their suppliers changes; layouts
/// compare it to decide when to rebind.
#[derive(Debug)]
pub struct UniformSuppliers {
    slots: Vec<SupplierSlot>,
    by_name: HashMap<String, usize>,
    generation: u64,
}

impl Default for UniformSuppliers {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformSuppliers {
    pub fn new() -> Self {
        let mut suppliers = Self {
            slots: Vec::new(),
            by_name: HashMap::new(),
            generation: 0,
        };
        suppliers.register(SCREEN_SIZE_UNIFORM, Supplier::ScreenSize);
        suppliers
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<SupplierId> {
        self.by_name.get(name).copied().map(SupplierId)
    }

    /// Registers (or replaces) the supplier for `name`.
    pub fn register(&mut self, name: &str, supplier: Supplier) -> SupplierId {
        self.generation += 1;
        if let Some(&idx) = self.by_name.get(name) {
            self.slots[idx].supplier = supplier;
            return SupplierId(idx);
        }
        let idx = self.slots.len();
        self.slots.push(SupplierSlot {
            name: name.to_string(),
            supplier,
            stored: None,
        });
        self.by_name.insert(name.to_string(), idx);
        debug!(name, generation = self.generation, "registered uniform supplier");
        SupplierId(idx)
    }

    pub fn register_fn(
        &mut self,
        name: &str,
        f: impl Fn(&SupplierContext<'_>) -> Option<UniformValue> + 'static,
    ) -> SupplierId {
        self.register(name, Supplier::Custom(Arc::new(f)))
    }

    /// Stores a client value. The first value for a name registers a store-backed supplier.
    pub fn set_value(&mut self, name: &str, value: UniformValue) -> SupplierId {
        let id = match self.lookup(name) {
            Some(id) => id,
            None => self.register(name, Supplier::Stored),
        };
        self.set_value_at(id, value);
        id
    }

    /// Indexed form of [`Self::set_value`] for callers that resolved the name once.
    pub fn set_value_at(&mut self, id: SupplierId, value: UniformValue) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.stored = Some(value);
        }
    }

    pub fn name(&self, id: SupplierId) -> Option<&str> {
        self.slots.get(id.0).map(|slot| slot.name.as_str())
    }

    /// Pulls the current value. `None` when the supplier has nothing to offer yet.
    pub fn supply(&self, id: SupplierId, cx: &SupplierContext<'_>) -> Option<UniformValue> {
        let slot = self.slots.get(id.0)?;
        match &slot.supplier {
            Supplier::ScreenSize => Some(UniformValue::Vec2([
                cx.state.viewport.width as f32,
                cx.state.viewport.height as f32,
            ])),
            Supplier::Stored => slot.stored,
            Supplier::Custom(f) => f(cx),
        }
    }
}
