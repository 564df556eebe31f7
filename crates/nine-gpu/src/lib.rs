//! `nine-gpu` contains the GPU-side plumbing shared by the D3D9 translation layer.
//!
//! Currently this crate provides:
//! - A small buffer HAL ([`hal::GpuBackend`]) with typed resource ids.
//! - A `wgpu` implementation of that HAL ([`WgpuBackend`]) and an in-memory one
//!   ([`MemoryBackend`]) for headless use and tests.
//! - A growable ring allocator for transient uploads ([`FastUploadAllocator`]).

mod buffer_arena;
mod error;
mod upload;

pub mod backend;
pub mod hal;

pub use backend::memory::MemoryBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use buffer_arena::{align_up, BufferArena};
pub use error::GpuError;
pub use upload::{FastUploadAllocator, UploadAllocation, UploadAllocatorDesc, UploadStats};
