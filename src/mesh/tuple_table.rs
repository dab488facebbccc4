//! Sorted storage for fixed-size index tuples.
//!
//! Entities of one dimension are identified by the sorted tuple of node indices they span.
//! Keeping all tuples of a dimension in one lexicographically sorted flat array
//! gives every entity a dense index (its position in the array)
//! and turns "which entity has these nodes" into a binary search.

use std::cmp::Ordering;

/// A lexicographically sorted, deduplicated set of `tuple_size`-length index tuples
/// stored in a flat Vec.
#[derive(Clone, Debug, Default)]
pub(crate) struct TupleTable {
    tuple_size: usize,
    data: Vec<usize>,
}

impl TupleTable {
    /// Build a table from a flat list of tuples in arbitrary order.
    ///
    /// Each tuple must already have its own entries sorted;
    /// duplicate tuples are merged.
    pub fn from_unsorted(tuple_size: usize, raw: &[usize]) -> Self {
        assert!(tuple_size > 0, "tuples must contain at least one index");
        let mut tuples: Vec<&[usize]> = raw.chunks_exact(tuple_size).collect();
        tuples.sort_unstable();
        tuples.dedup();

        let mut data = Vec::with_capacity(tuples.len() * tuple_size);
        for t in tuples {
            data.extend_from_slice(t);
        }
        Self { tuple_size, data }
    }

    /// Number of tuples in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.tuple_size
    }

    /// Get the tuple at the given position.
    #[inline]
    pub fn get(&self, idx: usize) -> &[usize] {
        let start = idx * self.tuple_size;
        &self.data[start..start + self.tuple_size]
    }

    /// Find the position of a sorted tuple.
    pub fn position(&self, tuple: &[usize]) -> Option<usize> {
        if tuple.len() != self.tuple_size {
            return None;
        }
        let mut lo = 0;
        let mut hi = self.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.get(mid).cmp(tuple) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// Iterate over all tuples in order.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, usize> {
        self.data.chunks_exact(self.tuple_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_and_dedups() {
        #[rustfmt::skip]
        let raw = [
            2, 3,
            0, 1,
            1, 2,
            0, 1,
            0, 3,
        ];
        let table = TupleTable::from_unsorted(2, &raw);
        assert_eq!(table.len(), 4);
        itertools::assert_equal(
            table.iter(),
            [[0, 1], [0, 3], [1, 2], [2, 3]].iter().map(|t| &t[..]),
        );
        assert_eq!(table.position(&[1, 2]), Some(2));
        assert_eq!(table.position(&[1, 3]), None);
        assert_eq!(table.position(&[1]), None);
    }
}
