use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("gpu backend error: {0}")]
    Backend(String),
    #[error("unsupported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("unknown {kind} id {id}")]
    UnknownResource { kind: &'static str, id: u64 },
    #[error("out of memory (requested {requested} bytes)")]
    OutOfMemory { requested: u64 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
