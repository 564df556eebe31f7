pub mod memory;
pub mod wgpu_backend;
