use std::ops::Range;

use crate::ecs::storage::SparseMask;

/// Decides which slots of a row range belong to a query result.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotFilter<'a> {
    /// Every slot matches.
    All,
    /// Slots whose sparse mask includes `include` and avoids `exclude`.
    Masks {
        masks: &'a [SparseMask],
        include: &'a SparseMask,
        exclude: &'a SparseMask,
    },
    /// Slots flagged `true`.
    Flags(&'a [bool]),
}

impl<'a> SlotFilter<'a> {
    /// A filter over `masks`, collapsing to [`SlotFilter::All`] when there is nothing to check.
    pub fn masks(masks: &'a [SparseMask], include: &'a SparseMask, exclude: &'a SparseMask) -> Self {
        if include.is_empty() && exclude.is_empty() {
            SlotFilter::All
        } else {
            SlotFilter::Masks {
                masks,
                include,
                exclude,
            }
        }
    }

    #[inline]
    pub fn accepts(&self, slot: usize) -> bool {
        match self {
            SlotFilter::All => true,
            SlotFilter::Masks {
                masks,
                include,
                exclude,
            } => masks[slot].matches(include, exclude),
            SlotFilter::Flags(flags) => flags[slot],
        }
    }
}

/// Split `0..len` into maximal runs of accepted slots, each at most `max_len` long.
pub(crate) fn matching_runs(len: usize, filter: SlotFilter<'_>, max_len: usize) -> Vec<Range<usize>> {
    let max_len = max_len.max(1);
    let mut runs = Vec::new();
    let mut start = None;

    for slot in 0..=len {
        let accepted = slot < len && filter.accepts(slot);
        match (start, accepted) {
            (None, true) => start = Some(slot),
            (Some(from), true) if slot - from == max_len => {
                runs.push(from..slot);
                start = Some(slot);
            }
            (Some(from), false) => {
                runs.push(from..slot);
                start = None;
            }
            _ => {}
        }
    }
    runs
}

/// Rows handed to each worker when `len` rows are split across `workers`, never fewer than
/// `min_len`.
#[inline]
pub(crate) fn chunk_len(len: usize, workers: usize, min_len: usize) -> usize {
    len.div_ceil(workers.max(1)).max(min_len).max(1)
}
