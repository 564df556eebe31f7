//! `nine-d3d9` is the state-tracking core of a Direct3D 9 driver layered on `wgpu`.
//!
//! Currently this crate provides:
//! - Dirty tracking and typed D3D9 state blocks with their `wgpu` translation (see [`state`]).
//! - Vertex declarations and memoized input layouts (see [`vertex`]).
//! - Input assembly with user-pointer uploads and triangle-fan emulation (see [`input`]).
//! - A packed pipeline key, an LRU pipeline cache and the per-draw resolver (see [`pipeline`]).
//! - Versioned shader constants (see [`constants`]).
//! - The [`Device`] that exposes all of it as DDI calls, on top of any [`NativeDevice`].

pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod input;
pub mod native;
pub mod pipeline;
pub mod shader;
pub mod stage;
pub mod state;
pub mod vertex;

pub use config::{ConfigError, DeviceConfig};
pub use device::render_state::{d3d9, ATOC_FOURCC};
pub use device::{Device, ResourceHandle, WrappedResources};
pub use error::{
    ddi_status, DdiError, HResult, D3DERR_INVALIDCALL, E_FAIL, E_NOTIMPL, E_OUTOFMEMORY, S_OK,
};
pub use native::{
    NativeCommand, NativeDevice, PipelineShaders, RecordedPipeline, RecordingDevice,
    WgpuNativeDevice,
};
pub use shader::{
    FixedFunctionKey, ShaderId, ShaderStage, ShaderTranslateError, ShaderTranslator,
    TranslatedShader,
};
