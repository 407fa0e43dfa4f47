// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use std::fmt;

/// The raw byte used by genotype sources for an absent call. Any byte outside
/// `0..=2` is treated the same way by the packer.
pub const MISSING_GENOTYPE: u8 = 3;

/// Loci are packed in groups of 128 so both bit planes of a sample span a whole
/// number of 64-bit words.
pub const BLOCK_ALIGNMENT: usize = 128;
/// The smallest block the scheduler will stream, in loci.
pub const MIN_BLOCK_SIZE: usize = 256;
/// The largest block the scheduler will stream, in loci.
pub const MAX_BLOCK_SIZE: usize = 65_536;

/// Number of loci held by one packed machine word.
pub const LOCI_PER_WORD: usize = u64::BITS as usize;

/// A diploid genotype call for one sample at one locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Genotype {
    Dosage0,
    Dosage1,
    Dosage2,
    Missing,
}

impl Genotype {
    /// Interprets a raw source byte. Values outside the dosage domain are missing.
    #[inline(always)]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Dosage0,
            1 => Self::Dosage1,
            2 => Self::Dosage2,
            _ => Self::Missing,
        }
    }

    /// The (plane A, plane B) bit pair for this call.
    ///
    /// `A ^ B` is set exactly at heterozygous calls and `A | !B` is cleared exactly
    /// at missing calls. Opposite homozygotes differ in plane A.
    #[inline(always)]
    pub fn plane_bits(self) -> (bool, bool) {
        match self {
            Self::Dosage0 => (false, false),
            Self::Dosage1 => (true, false),
            Self::Dosage2 => (true, true),
            Self::Missing => (false, true),
        }
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dosage0 => f.write_str("0"),
            Self::Dosage1 => f.write_str("1"),
            Self::Dosage2 => f.write_str("2"),
            Self::Missing => f.write_str("NA"),
        }
    }
}

/// Running identity-by-state counters for one (row, column) sample pair.
///
/// `num` counts loci at which both samples are called. `ibscnt` accumulates
/// 0, 1 or 2 per such locus off the diagonal, and 0 or 1 on the diagonal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairCounts {
    pub ibscnt: u32,
    pub num: u32,
}

impl PairCounts {
    #[inline(always)]
    pub fn add(&mut self, ibscnt: u32, num: u32) {
        self.ibscnt += ibscnt;
        self.num += num;
    }
}

/// A position in the upper triangle of the sample-by-sample matrix, `row <= column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairPosition {
    pub row: usize,
    pub column: usize,
}

impl PairPosition {
    #[inline]
    pub fn new(row: usize, column: usize) -> Self {
        debug_assert!(row <= column, "pair position must lie in the upper triangle");
        Self { row, column }
    }

    #[inline(always)]
    pub fn is_diagonal(&self) -> bool {
        self.row == self.column
    }
}

impl fmt::Display for PairPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_domain_bytes_are_missing() {
        assert_eq!(Genotype::from_raw(3), Genotype::Missing);
        assert_eq!(Genotype::from_raw(9), Genotype::Missing);
        assert_eq!(Genotype::from_raw(255), Genotype::Missing);
        assert_eq!(Genotype::from_raw(2), Genotype::Dosage2);
    }

    #[test]
    fn plane_bits_separate_heterozygotes_and_missing_calls() {
        for raw in 0..=3u8 {
            let genotype = Genotype::from_raw(raw);
            let (a, b) = genotype.plane_bits();
            assert_eq!(a ^ b, matches!(genotype, Genotype::Dosage1 | Genotype::Missing));
            assert_eq!(a | !b, genotype != Genotype::Missing);
        }
    }

    #[test]
    fn block_bounds_are_aligned() {
        assert_eq!(MIN_BLOCK_SIZE % BLOCK_ALIGNMENT, 0);
        assert_eq!(MAX_BLOCK_SIZE % BLOCK_ALIGNMENT, 0);
        assert_eq!(BLOCK_ALIGNMENT % (2 * LOCI_PER_WORD), 0);
    }
}
