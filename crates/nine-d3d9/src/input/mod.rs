mod assembly;
mod buffer;

pub use assembly::{
    DrawCall, DrawParams, IndexBinding, IndexBufferBinding, IndexFormat, InputAssembly,
    ResolvedInput, StreamFrequency, VertexBufferBinding, VertexStream,
    D3DSTREAMSOURCE_INDEXEDDATA, D3DSTREAMSOURCE_INSTANCEDATA, MAX_VERTEX_STRIDE,
};
pub use buffer::{InputBuffer, UploadedWindow};
