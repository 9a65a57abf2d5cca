//! Round-robin selection.

/// Round-robin cursor.
///
/// Owned by exactly one event loop and advanced through `&mut self`, so it
/// needs no atomics. The cursor always stays within `0..len`.
#[derive(Debug, Default, Clone)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current index for a list of `len` items and advance.
    ///
    /// Returns `None` for an empty list without touching the cursor.
    pub fn next_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let index = self.cursor % len;
        self.cursor = (index + 1) % len;
        Some(index)
    }

    /// Select the next item from `items`.
    pub fn next<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        self.next_index(items.len()).map(|i| &items[i])
    }
}
