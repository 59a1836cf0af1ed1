//! Legacy resource handle registry.
//!
//! Legacy clients name resources with small sequential integers (`glGenBuffers` style). The registry
//! hands those out per [`ResourceCategory`] and maps each live handle to the opaque [`NativeHandle`]
//! returned by the backend. It is the sole authority on handle validity: anything that does not
//! resolve here is treated as unbound.

use std::fmt;

use hashbrown::HashMap;
use tracing::debug;

use crate::backend::NativeHandle;

/// Resource namespaces. Each category has its own id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    VertexBuffer,
    IndexBuffer,
    Texture,
    Framebuffer,
    Program,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 5] = [
        ResourceCategory::VertexBuffer,
        ResourceCategory::IndexBuffer,
        ResourceCategory::Texture,
        ResourceCategory::Framebuffer,
        ResourceCategory::Program,
    ];

    const fn index(self) -> usize {
        match self {
            Self::VertexBuffer => 0,
            Self::IndexBuffer => 1,
            Self::Texture => 2,
            Self::Framebuffer => 3,
            Self::Program => 4,
        }
    }
}

/// Legacy-style integer handle. `0` always means "unbound".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LegacyHandle(pub u32);

impl LegacyHandle {
    pub const NONE: LegacyHandle = LegacyHandle(0);

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for LegacyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    native: Option<NativeHandle>,
}

/// Lifecycle view of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Allocated but no native resource attached yet.
    Allocated,
    Bound(NativeHandle),
}

#[derive(Debug, Default)]
struct CategorySpace {
    next_id: u32,
    entries: HashMap<u32, Entry>,
}

impl CategorySpace {
    fn next_free_id(&mut self) -> u32 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id == 0 {
                continue;
            }
            if !self.entries.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }
}

/// Per-instance handle registry. Counters are owned here (not process-wide) so independent
/// translation contexts never collide.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    spaces: [CategorySpace; 5],
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh non-zero handle in `category`.
    ///
    /// Handles are monotonic within a category; a released handle is not handed out again until the
    /// 32-bit counter wraps, and live handles are always skipped.
    pub fn allocate(&mut self, category: ResourceCategory) -> LegacyHandle {
        let space = &mut self.spaces[category.index()];
        let id = space.next_free_id();
        space.entries.insert(id, Entry { native: None });
        debug!(?category, handle = id, "allocated legacy handle");
        LegacyHandle(id)
    }

    /// Attaches `native` to a live handle.
    ///
    /// Returns `Ok(previous)` on success; a replaced native handle must be destroyed by the caller.
    /// Returns `Err(native)` (handing the native back) when `handle` is not a live entry.
    pub fn bind(
        &mut self,
        category: ResourceCategory,
        handle: LegacyHandle,
        native: NativeHandle,
    ) -> Result<Option<NativeHandle>, NativeHandle> {
        if handle.is_none() {
            return Err(native);
        }
        match self.spaces[category.index()].entries.get_mut(&handle.0) {
            Some(entry) => Ok(entry.native.replace(native)),
            None => Err(native),
        }
    }

    /// Resolves a handle to its native resource. `None` is NOT_FOUND: handle `0`, unknown,
    /// released, or allocated without a native resource attached.
    pub fn resolve(&self, category: ResourceCategory, handle: LegacyHandle) -> Option<NativeHandle> {
        if handle.is_none() {
            return None;
        }
        self.spaces[category.index()]
            .entries
            .get(&handle.0)
            .and_then(|entry| entry.native)
    }

    pub fn state(&self, category: ResourceCategory, handle: LegacyHandle) -> Option<EntryState> {
        if handle.is_none() {
            return None;
        }
        self.spaces[category.index()]
            .entries
            .get(&handle.0)
            .map(|entry| match entry.native {
                Some(native) => EntryState::Bound(native),
                None => EntryState::Allocated,
            })
    }

    pub fn is_live(&self, category: ResourceCategory, handle: LegacyHandle) -> bool {
        self.state(category, handle).is_some()
    }

    /// Removes the mapping. Returns the native handle that must now be destroyed (exactly once) by
    /// the caller, or `None` if there is nothing to destroy.
    pub fn release(&mut self, category: ResourceCategory, handle: LegacyHandle) -> Option<NativeHandle> {
        if handle.is_none() {
            return None;
        }
        let entry = self.spaces[category.index()].entries.remove(&handle.0)?;
        debug!(?category, handle = handle.0, "released legacy handle");
        entry.native
    }

    pub fn live_count(&self, category: ResourceCategory) -> usize {
        self.spaces[category.index()].entries.len()
    }

    /// Removes every entry, returning all native handles that need destruction.
    pub fn drain(&mut self) -> Vec<NativeHandle> {
        let mut natives = Vec::new();
        for space in &mut self.spaces {
            natives.extend(space.entries.drain().filter_map(|(_, entry)| entry.native));
        }
        natives
    }
}
