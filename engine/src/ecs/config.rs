//! Construction parameters for a [`World`](crate::ecs::World).

/// Tuning knobs for a world.
///
/// ```rust,ignore
/// let world = World::with_config(WorldConfig::default().with_workers(4).with_min_chunk_len(256));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldConfig {
    /// Worker threads used by the parallel runners. The pool is started on first use.
    pub workers: usize,

    /// Lower bound on the rows handed to a single parallel chunk.
    pub min_chunk_len: usize,

    /// First allocation for an archetype's buffers. Growth doubles from there.
    pub initial_capacity: usize,

    /// Page size of the entity index used by sparse component sets.
    pub sparse_block_size: usize,
}

impl WorldConfig {
    pub const DEFAULT_MIN_CHUNK_LEN: usize = 64;
    pub const DEFAULT_INITIAL_CAPACITY: usize = 16;
    pub const DEFAULT_SPARSE_BLOCK_SIZE: usize = 256;

    /// Set the worker count. Clamped to at least one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the minimum parallel chunk length. Clamped to at least one.
    pub fn with_min_chunk_len(mut self, len: usize) -> Self {
        self.min_chunk_len = len.max(1);
        self
    }

    /// Set the initial archetype capacity. Clamped to at least one.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity.max(1);
        self
    }

    /// Set the sparse index page size. Clamped to at least one.
    pub fn with_sparse_block_size(mut self, size: usize) -> Self {
        self.sparse_block_size = size.max(1);
        self
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            min_chunk_len: Self::DEFAULT_MIN_CHUNK_LEN,
            initial_capacity: Self::DEFAULT_INITIAL_CAPACITY,
            sparse_block_size: Self::DEFAULT_SPARSE_BLOCK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_clamp_to_one() {
        // When
        let config = WorldConfig::default()
            .with_workers(0)
            .with_min_chunk_len(0)
            .with_initial_capacity(0)
            .with_sparse_block_size(0);

        // Then
        assert_eq!(config.workers, 1);
        assert_eq!(config.min_chunk_len, 1);
        assert_eq!(config.initial_capacity, 1);
        assert_eq!(config.sparse_block_size, 1);
    }

    #[test]
    fn default_has_at_least_one_worker() {
        assert!(WorldConfig::default().workers >= 1);
    }
}
