/// A block-paged map from entity indices to dense slots.
///
/// The index space is divided into fixed-size blocks, allocating memory only for blocks that
/// hold at least one entry. Entity indices are allocated sequentially and recycled, so live
/// indices cluster and most lookups land in a handful of resident blocks.
///
/// | Operation | Time | Memory |
/// |-----------|------|--------|
/// | `insert()` | O(1) amortized | Allocates block on first use |
/// | `get()` | O(1) | No allocation |
/// | `remove()` | O(1) | No deallocation (leaves `None`) |
///
/// ```ignore
/// let mut index = DynamicIndex::new_with_block_size(4);
/// index.insert(0, 0);
/// index.insert(9, 1);    // Block 2; block 1 is never allocated
/// assert_eq!(index.get(9), Some(1));
/// assert_eq!(index.get(5), None);
/// ```
#[derive(Debug)]
pub struct DynamicIndex {
    /// The size of blocks to allocate when growing the index.
    block_size: usize,

    /// Outer Vec is indexed by `index / block_size`, inner by `index % block_size`.
    blocks: Vec<Option<Box<[Option<u32>]>>>,
}

impl DynamicIndex {
    /// Default block size balances memory usage and access speed for typical entity patterns.
    pub const DEFAULT_BLOCK_SIZE: usize = 256;

    /// Create a new DynamicIndex with the default block size.
    #[inline]
    pub const fn new() -> Self {
        Self::new_with_block_size(Self::DEFAULT_BLOCK_SIZE)
    }

    /// Create a new DynamicIndex with a custom block size.
    ///
    /// # Panics
    ///
    /// Debug builds panic if block_size is 0.
    #[inline]
    pub const fn new_with_block_size(block_size: usize) -> Self {
        debug_assert!(block_size > 0, "block_size must be greater than 0");
        Self {
            block_size,
            blocks: Vec::new(),
        }
    }

    #[inline]
    fn indices(&self, index: usize) -> (usize, usize) {
        (index / self.block_size, index % self.block_size)
    }

    /// Map `index` to `slot`, replacing any previous mapping.
    pub fn insert(&mut self, index: usize, slot: usize) {
        let (block_index, within_block_index) = self.indices(index);

        if block_index >= self.blocks.len() {
            self.blocks.resize_with(block_index + 1, || None);
        }

        let block = self.blocks[block_index]
            .get_or_insert_with(|| vec![None; self.block_size].into_boxed_slice());
        block[within_block_index] = Some(slot as u32);
    }

    /// Get the slot mapped to `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<usize> {
        let (block_index, within_block_index) = self.indices(index);
        let block = self.blocks.get(block_index)?.as_ref()?;
        block[within_block_index].map(|slot| slot as usize)
    }

    /// Remove the mapping for `index`, returning the old slot.
    pub fn remove(&mut self, index: usize) -> Option<usize> {
        let (block_index, within_block_index) = self.indices(index);
        let block = self.blocks.get_mut(block_index)?.as_mut()?;
        block[within_block_index].take().map(|slot| slot as usize)
    }

    /// Whether `index` is mapped.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }
}

impl Default for DynamicIndex {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
