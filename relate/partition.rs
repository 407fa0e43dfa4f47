// ========================================================================================
//                          Load-balanced split of the pair space
// ========================================================================================
//
// The upper triangle is split on its linear index, so every range carries the same
// number of pairs (to within one). Ranges near the head of the triangle cover few long
// rows; ranges near the tail cover many short ones.

use crate::triangle::{PairCursor, pair_count, position_of};
use crate::types::PairPosition;
use std::ops::Range;

/// One worker's contiguous slice of the pair space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairRange {
    /// The first pair of the range.
    pub start: PairPosition,
    /// Linear offset of `start` in triangular storage.
    pub offset: usize,
    /// Number of pairs in the range.
    pub len: usize,
}

impl PairRange {
    /// The storage offsets covered by this range.
    #[inline]
    pub fn offsets(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Iterates the pairs of this range in storage order.
    #[inline]
    pub fn pairs(&self, n_samples: usize) -> PairCursor {
        PairCursor::new(self.start, n_samples, self.len)
    }
}

/// Splits the `N(N+1)/2` pairs of `n_samples` samples into at most `n_threads`
/// contiguous, disjoint ranges whose sizes differ by at most one pair.
///
/// The ranges are ordered by offset and cover the triangle exactly. Ranges that
/// would be empty (more threads than pairs) are omitted.
pub fn split_pair_space(n_threads: usize, n_samples: usize) -> Vec<PairRange> {
    let total = pair_count(n_samples);
    let n_threads = n_threads.max(1);
    let base = total / n_threads;
    let remainder = total % n_threads;

    let mut ranges = Vec::with_capacity(n_threads.min(total));
    let mut offset = 0;
    for thread in 0..n_threads {
        let len = base + usize::from(thread < remainder);
        if len == 0 {
            continue;
        }
        ranges.push(PairRange {
            start: position_of(offset, n_samples),
            offset,
            len,
        });
        offset += len;
    }
    debug_assert_eq!(offset, total);
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangle::offset_of;

    fn assert_exact_cover(ranges: &[PairRange], n: usize) {
        let mut expected_offset = 0;
        for range in ranges {
            assert_eq!(range.offset, expected_offset);
            assert_eq!(offset_of(range.start, n), range.offset);
            expected_offset += range.len;
        }
        assert_eq!(expected_offset, pair_count(n));
    }

    #[test]
    fn ranges_cover_triangle_exactly() {
        for n in 1..30 {
            for threads in 1..10 {
                let ranges = split_pair_space(threads, n);
                assert!(ranges.len() <= threads);
                assert_exact_cover(&ranges, n);
            }
        }
    }

    #[test]
    fn ranges_are_balanced_by_pair_count() {
        let ranges = split_pair_space(4, 100);
        let min = ranges.iter().map(|r| r.len).min().unwrap();
        let max = ranges.iter().map(|r| r.len).max().unwrap();
        assert!(max - min <= 1);
        assert_eq!(ranges.len(), 4);
    }

    #[test]
    fn tail_ranges_span_more_rows() {
        let n = 200;
        let ranges = split_pair_space(4, n);
        let rows_spanned = |r: &PairRange| {
            let last = r.pairs(n).last().unwrap();
            last.row - r.start.row + 1
        };
        assert!(rows_spanned(&ranges[3]) > rows_spanned(&ranges[0]));
    }

    #[test]
    fn more_threads_than_pairs_drops_empty_ranges() {
        let ranges = split_pair_space(8, 2);
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(|r| r.len == 1));
        assert_exact_cover(&ranges, 2);
    }

    #[test]
    fn zero_threads_is_treated_as_one() {
        let ranges = split_pair_space(0, 5);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start, PairPosition::new(0, 0));
        assert_eq!(ranges[0].offsets(), 0..15);
    }
}
