//! Single-slot "needs refresh" signal

use parking_lot::Mutex;

/// A mutex-guarded dirty bit
///
/// Not a queue: any number of `mark_dirty` calls before the next
/// `consume_if_dirty` collapse into a single pending refresh.
#[derive(Debug, Default)]
pub struct UpdateFlag {
    dirty: Mutex<bool>,
}

impl UpdateFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a refresh
    pub fn mark_dirty(&self) {
        *self.dirty.lock() = true;
    }

    /// Atomically read and clear the flag
    pub fn consume_if_dirty(&self) -> bool {
        std::mem::replace(&mut *self.dirty.lock(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_clean() {
        let flag = UpdateFlag::new();
        assert!(!flag.consume_if_dirty());
    }

    #[test]
    fn test_marks_coalesce() {
        let flag = UpdateFlag::new();
        flag.mark_dirty();
        flag.mark_dirty();
        flag.mark_dirty();

        assert!(flag.consume_if_dirty());
        assert!(!flag.consume_if_dirty());

        flag.mark_dirty();
        assert!(flag.consume_if_dirty());
    }
}
