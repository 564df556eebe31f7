//! Backend-agnostic resource handles and the buffer HAL.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use bitflags::bitflags;

use crate::GpuError;

/// Opaque handle to a backend resource.
///
/// Ids are never reused by a [`ResourceRegistry`] and `0` is never handed out, so callers can use
/// `0` as a "none" value in packed structures.
pub struct ResourceId<T> {
    raw: u64,
    _tag: PhantomData<fn() -> T>,
}

impl<T> ResourceId<T> {
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _tag: PhantomData,
        }
    }

    pub const fn raw(self) -> u64 {
        self.raw
    }
}

impl<T> Clone for ResourceId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceId<T> {}

impl<T> PartialEq for ResourceId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for ResourceId<T> {}

impl<T> Hash for ResourceId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> PartialOrd for ResourceId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ResourceId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> fmt::Debug for ResourceId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.raw)
    }
}

pub enum BufferTag {}
pub enum ShaderModuleTag {}
pub enum PipelineTag {}
pub enum TextureViewTag {}

pub type BufferId = ResourceId<BufferTag>;
pub type ShaderModuleId = ResourceId<ShaderModuleTag>;
pub type PipelineId = ResourceId<PipelineTag>;
pub type TextureViewId = ResourceId<TextureViewTag>;

/// Id allocator plus storage for one kind of backend object.
pub struct ResourceRegistry<Tag, T> {
    kind: &'static str,
    next: u64,
    entries: HashMap<u64, T>,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag, T> ResourceRegistry<Tag, T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            next: 1,
            entries: HashMap::new(),
            _tag: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> ResourceId<Tag> {
        let raw = self.next;
        self.next += 1;
        self.entries.insert(raw, value);
        ResourceId::from_raw(raw)
    }

    pub fn get(&self, id: ResourceId<Tag>) -> Result<&T, GpuError> {
        self.entries.get(&id.raw).ok_or(GpuError::UnknownResource {
            kind: self.kind,
            id: id.raw,
        })
    }

    pub fn get_mut(&mut self, id: ResourceId<Tag>) -> Result<&mut T, GpuError> {
        let kind = self.kind;
        self.entries
            .get_mut(&id.raw)
            .ok_or(GpuError::UnknownResource { kind, id: id.raw })
    }

    pub fn remove(&mut self, id: ResourceId<Tag>) -> Result<T, GpuError> {
        self.entries.remove(&id.raw).ok_or(GpuError::UnknownResource {
            kind: self.kind,
            id: id.raw,
        })
    }

    pub fn contains(&self, id: ResourceId<Tag>) -> bool {
        self.entries.contains_key(&id.raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (ResourceId<Tag>, T)> + '_ {
        self.entries
            .drain()
            .map(|(raw, value)| (ResourceId::from_raw(raw), value))
    }
}

impl<Tag, T> fmt::Debug for ResourceRegistry<Tag, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("kind", &self.kind)
            .field("live", &self.entries.len())
            .finish()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsages: u32 {
        const MAP_WRITE = 1 << 0;
        const COPY_SRC = 1 << 1;
        const COPY_DST = 1 << 2;
        const INDEX = 1 << 3;
        const VERTEX = 1 << 4;
        const UNIFORM = 1 << 5;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsages,
}

/// Minimal buffer interface the upload paths need from a GPU backend.
pub trait GpuBackend {
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferId, GpuError>;

    fn destroy_buffer(&mut self, id: BufferId) -> Result<(), GpuError>;

    /// Write `data` at `offset`. Both must be multiples of [`COPY_ALIGNMENT`].
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError>;
}

/// Alignment required for buffer write offsets and sizes (matches `wgpu::COPY_BUFFER_ALIGNMENT`).
pub const COPY_ALIGNMENT: u64 = 4;
