//! Native pipeline objects keyed by [`PipelineStateKey`].

use std::num::NonZeroUsize;

use hashbrown::{HashMap, HashSet};
use lru::LruCache;
use nine_gpu::hal::PipelineId;
use tracing::{debug, trace};

use super::desc::PipelineStateDesc;
use super::key::PipelineStateKey;
use crate::error::DdiError;
use crate::native::{NativeDevice, PipelineShaders};
use crate::shader::ShaderId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Debug)]
struct CachedPipeline {
    pipeline: PipelineId,
    shaders: [Option<ShaderId>; 3],
}

/// Owns every native pipeline it hands out. Callers get a [`PipelineId`] that stays valid until
/// the entry is evicted or a shader it uses is destroyed, and then until the next
/// [`destroy_retired`](Self::destroy_retired), which must only run once the commands that may
/// still name it have been flushed.
pub struct PipelineStateCache {
    entries: LruCache<PipelineStateKey, CachedPipeline>,
    /// Keys of every entry that references a shader, for invalidation on shader destruction.
    by_shader: HashMap<ShaderId, HashSet<PipelineStateKey>>,
    /// Pipelines dropped from `entries` whose native objects are still alive.
    retired: Vec<PipelineId>,
    stats: PipelineCacheStats,
}

impl PipelineStateCache {
    /// `capacity == 0` disables eviction.
    pub fn new(capacity: usize) -> Self {
        let entries = match NonZeroUsize::new(capacity) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries,
            by_shader: HashMap::new(),
            retired: Vec::new(),
            stats: PipelineCacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    /// Pipelines that left the cache but have not been destroyed yet.
    pub fn retired(&self) -> usize {
        self.retired.len()
    }

    /// Number of cached pipelines built with `shader`.
    pub fn entries_using(&self, shader: ShaderId) -> usize {
        self.by_shader.get(&shader).map_or(0, HashSet::len)
    }

    pub fn get_pipeline_state<D: NativeDevice + ?Sized>(
        &mut self,
        native: &mut D,
        desc: &PipelineStateDesc,
        shaders: &PipelineShaders<'_>,
    ) -> Result<PipelineId, DdiError> {
        let [vs, ps, gs] = shaders.ids();
        let key = PipelineStateKey::new(desc, vs, ps, gs);
        if let Some(entry) = self.entries.get(&key) {
            self.stats.hits += 1;
            trace!(?key, pipeline = ?entry.pipeline, "pipeline cache hit");
            return Ok(entry.pipeline);
        }

        self.stats.misses += 1;
        let pipeline = native.create_pipeline(desc, shaders)?;
        debug!(?key, ?pipeline, entries = self.entries.len() + 1, "pipeline cache miss");

        let ids = shaders.ids();
        for shader in ids.iter().flatten() {
            self.by_shader.entry(*shader).or_default().insert(key);
        }
        let evicted = self.entries.push(
            key,
            CachedPipeline {
                pipeline,
                shaders: ids,
            },
        );
        if let Some((old_key, old)) = evicted {
            // `push` also returns the displaced value when the key was already present, which
            // cannot happen after a failed `get`.
            debug_assert!(old_key != key);
            self.stats.evictions += 1;
            debug!(key = ?old_key, pipeline = ?old.pipeline, "pipeline cache eviction");
            self.unlink(&old_key, &old);
            self.retired.push(old.pipeline);
        }
        Ok(pipeline)
    }

    /// Drop every pipeline built with `shader` from the cache. Returns how many were removed.
    /// The native objects are retired, not destroyed.
    pub fn on_shader_destroyed(&mut self, shader: ShaderId) -> usize {
        let Some(keys) = self.by_shader.remove(&shader) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            let Some(entry) = self.entries.pop(&key) else {
                continue;
            };
            self.unlink(&key, &entry);
            self.retired.push(entry.pipeline);
            removed += 1;
        }
        debug!(shader = shader.raw(), removed, "pipelines invalidated by shader destruction");
        removed
    }

    /// Destroy the native objects of every retired pipeline. Only call this after a flush.
    pub fn destroy_retired<D: NativeDevice + ?Sized>(
        &mut self,
        native: &mut D,
    ) -> Result<usize, DdiError> {
        let count = self.retired.len();
        while let Some(pipeline) = self.retired.pop() {
            native.destroy_pipeline(pipeline)?;
        }
        if count > 0 {
            debug!(count, "destroyed retired pipelines");
        }
        Ok(count)
    }

    /// Destroy every cached and retired pipeline. Only call this after a flush.
    pub fn clear<D: NativeDevice + ?Sized>(&mut self, native: &mut D) -> Result<(), DdiError> {
        self.by_shader.clear();
        while let Some((_, entry)) = self.entries.pop_lru() {
            self.retired.push(entry.pipeline);
        }
        self.destroy_retired(native)?;
        Ok(())
    }

    fn unlink(&mut self, key: &PipelineStateKey, entry: &CachedPipeline) {
        for shader in entry.shaders.iter().flatten() {
            if let Some(keys) = self.by_shader.get_mut(shader) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_shader.remove(shader);
                }
            }
        }
    }
}

impl std::fmt::Debug for PipelineStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStateCache")
            .field("entries", &self.entries.len())
            .field("shaders", &self.by_shader.len())
            .field("retired", &self.retired.len())
            .field("stats", &self.stats)
            .finish()
    }
}
