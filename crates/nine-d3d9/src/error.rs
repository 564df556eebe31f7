use nine_gpu::GpuError;
use thiserror::Error;

use crate::shader::ShaderTranslateError;
use crate::vertex::VertexInputError;

/// Legacy status code returned across the DDI boundary.
pub type HResult = i32;

pub const S_OK: HResult = 0;
pub const E_FAIL: HResult = 0x8000_4005_u32 as i32;
pub const E_NOTIMPL: HResult = 0x8000_4001_u32 as i32;
pub const E_OUTOFMEMORY: HResult = 0x8007_000E_u32 as i32;
pub const D3DERR_INVALIDCALL: HResult = 0x8876_086C_u32 as i32;

#[derive(Debug, Error)]
pub enum DdiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("internal invariant violated: {0}")]
    InvariantViolation(&'static str),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Translate(#[from] ShaderTranslateError),
}

impl DdiError {
    pub fn hresult(&self) -> HResult {
        match self {
            DdiError::InvalidArgument(_) => D3DERR_INVALIDCALL,
            DdiError::OutOfMemory(_) => E_OUTOFMEMORY,
            DdiError::NotImplemented(_) => E_NOTIMPL,
            DdiError::InvariantViolation(_) => E_FAIL,
            // Buffer and pipeline creation failures surface as allocation failures.
            DdiError::Gpu(GpuError::OutOfMemory { .. } | GpuError::Backend(_)) => E_OUTOFMEMORY,
            DdiError::Gpu(GpuError::Unsupported(_)) => E_NOTIMPL,
            DdiError::Gpu(GpuError::UnknownResource { .. } | GpuError::InvalidArgument(_)) => {
                D3DERR_INVALIDCALL
            }
            DdiError::Translate(_) => D3DERR_INVALIDCALL,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DdiError::InvalidArgument(msg.into())
    }
}

impl From<VertexInputError> for DdiError {
    fn from(err: VertexInputError) -> Self {
        DdiError::InvalidArgument(err.to_string())
    }
}

/// Collapse a DDI result into the status code handed back to the runtime.
pub fn ddi_status<T>(result: &Result<T, DdiError>) -> HResult {
    match result {
        Ok(_) => S_OK,
        Err(err) => err.hresult(),
    }
}
