//! Generation-stamped visited set for graph traversal.
//!
//! Indexed directly by object id (slot 0 unused). `clear()` bumps a generation
//! counter instead of zeroing the array, so a reused set costs O(1) per query.

/// Visited set over object ids.
///
/// Uses a u16 generation, so the backing array is only zeroed every 65534 clears.
#[derive(Debug)]
pub struct VisitedSet {
    stamps: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    /// Creates a set able to hold ids `0..=max_id` without growing.
    pub fn new(max_id: usize) -> Self {
        Self {
            stamps: vec![0u16; max_id + 1],
            generation: 1,
        }
    }

    /// Forgets every visited id.
    pub fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.stamps.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Grows to cover ids up to `max_id`.
    pub fn ensure_capacity(&mut self, max_id: usize) {
        if max_id >= self.stamps.len() {
            self.stamps.resize(max_id + 1, 0);
        }
    }

    /// Marks `id` visited. Returns `true` if it was not visited before.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let idx = id as usize;
        if idx >= self.stamps.len() {
            self.stamps.resize(idx + 1, 0);
        }
        if self.stamps[idx] == self.generation {
            false
        } else {
            self.stamps[idx] = self.generation;
            true
        }
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_clear() {
        let mut vs = VisitedSet::new(100);
        assert!(vs.insert(1));
        assert!(!vs.insert(1));
        assert!(vs.insert(50));

        vs.clear();
        assert!(vs.insert(1));
        assert!(!vs.insert(1));
    }

    #[test]
    fn test_grows_on_demand() {
        let mut vs = VisitedSet::default();
        assert!(vs.insert(42));
        assert!(!vs.insert(42));
        vs.ensure_capacity(1_000);
        assert!(vs.insert(1_000));
        assert!(!vs.insert(42));
    }

    #[test]
    fn test_generation_overflow() {
        let mut vs = VisitedSet::new(10);
        for _ in 0..65534 {
            vs.clear();
        }
        assert_eq!(vs.generation, u16::MAX);
        vs.insert(5);

        // Next clear zeroes the stamps and restarts at 1
        vs.clear();
        assert_eq!(vs.generation, 1);
        assert!(vs.insert(5));
    }
}
