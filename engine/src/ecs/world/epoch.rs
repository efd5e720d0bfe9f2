/// Tracks nested iteration. Rows spawned while an epoch is open are staged and merged when the
/// outermost epoch closes.
#[derive(Debug, Default)]
pub(crate) struct Epoch {
    depth: u32,
    current: u64,
}

impl Epoch {
    /// Open an epoch, returning its number. Nested opens share the outer epoch's number.
    pub fn begin(&mut self) -> u64 {
        if self.depth == 0 {
            self.current += 1;
        }
        self.depth += 1;
        self.current
    }

    /// Close an epoch. Returns true when the outermost epoch was closed.
    pub fn end(&mut self) -> bool {
        debug_assert!(self.depth > 0, "iteration epoch closed twice");
        self.depth = self.depth.saturating_sub(1);
        self.depth == 0
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.depth > 0
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_epochs_share_a_number() {
        // Given
        let mut epoch = Epoch::default();

        // When
        let outer = epoch.begin();
        let inner = epoch.begin();

        // Then
        assert_eq!(outer, inner);
        assert!(!epoch.end());
        assert!(epoch.is_open());
        assert!(epoch.end());
        assert!(!epoch.is_open());
        assert_eq!(epoch.begin(), outer + 1);
    }
}
