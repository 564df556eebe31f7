//! Pipeline descriptors, their packed cache keys, the cache and the per-draw resolver.

mod cache;
mod desc;
mod key;
mod state;

pub use cache::{PipelineCacheStats, PipelineStateCache};
pub use desc::{PipelineBlendDesc, PipelineStateDesc};
pub use key::{PipelineStateKey, KEY_BYTES};
pub use state::{PipelineState, ResolvedDraw};
