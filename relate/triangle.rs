// ========================================================================================
//
//                     Upper-triangular pair space: indexing and storage
//
// ========================================================================================
//
// Pairs (row, column) with row <= column are laid out row by row, diagonal first:
//
//     (0,0) (0,1) ... (0,n-1) (1,1) (1,2) ... (1,n-1) (2,2) ... (n-1,n-1)
//
// Every piece of the engine that converts between a pair and its linear offset goes
// through the two functions below.

use crate::error::BetaError;
use crate::types::PairPosition;

/// The number of pairs in the upper triangle of an `n x n` matrix, diagonal included.
#[inline]
pub fn pair_count(n: usize) -> usize {
    n * (n + 1) / 2
}

/// The linear offset of the first pair of `row`.
#[inline(always)]
fn row_start(row: usize, n: usize) -> usize {
    // row * n - row * (row - 1) / 2, written to stay in unsigned arithmetic.
    row * (2 * n - row + 1) / 2
}

/// Maps an upper-triangular position to its linear offset.
#[inline(always)]
pub fn offset_of(position: PairPosition, n: usize) -> usize {
    debug_assert!(position.row <= position.column && position.column < n);
    row_start(position.row, n) + (position.column - position.row)
}

/// Maps a linear offset back to its upper-triangular position.
///
/// Finds the last row whose starting offset is `<= offset` by binary search, which
/// keeps the inverse exact for any `n` without floating point.
pub fn position_of(offset: usize, n: usize) -> PairPosition {
    debug_assert!(offset < pair_count(n));
    let (mut lo, mut hi) = (0usize, n);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if row_start(mid, n) <= offset {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let row = lo;
    PairPosition::new(row, row + (offset - row_start(row, n)))
}

/// Walks the triangle in storage order starting from a given position.
#[derive(Debug, Clone)]
pub struct PairCursor {
    next: PairPosition,
    n: usize,
    remaining: usize,
}

impl PairCursor {
    pub fn new(start: PairPosition, n: usize, len: usize) -> Self {
        debug_assert!(len == 0 || offset_of(start, n) + len <= pair_count(n));
        Self {
            next: start,
            n,
            remaining: len,
        }
    }
}

impl Iterator for PairCursor {
    type Item = PairPosition;

    #[inline]
    fn next(&mut self) -> Option<PairPosition> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next;
        self.remaining -= 1;
        if current.column + 1 < self.n {
            self.next.column += 1;
        } else {
            self.next.row += 1;
            self.next.column = self.next.row;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PairCursor {}

/// Flat storage for a symmetric relation, one entry per upper-triangular pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangularMatrix<T> {
    n: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> TriangularMatrix<T> {
    /// Allocates a default-filled triangle for `n` samples. Allocation failure is
    /// reported rather than aborting the process.
    pub fn zeroed(n: usize) -> Result<Self, BetaError> {
        let len = pair_count(n);
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| BetaError::Allocation {
                what: "pair counters",
                bytes: len.saturating_mul(std::mem::size_of::<T>()),
            })?;
        data.resize(len, T::default());
        Ok(Self { n, data })
    }

    /// Reads the entry for an unordered pair.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        let (row, column) = if i <= j { (i, j) } else { (j, i) };
        self.data[offset_of(PairPosition::new(row, column), self.n)]
    }
}

impl<T> TriangularMatrix<T> {
    /// The number of samples (matrix dimension).
    #[inline]
    pub fn dim(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Iterates entries in storage order together with their positions.
    pub fn iter(&self) -> impl Iterator<Item = (PairPosition, &T)> + '_ {
        PairCursor::new(PairPosition::new(0, 0), self.n, self.data.len()).zip(self.data.iter())
    }
}
