// ========================================================================================
//
//                       The packer: genotype bytes into bit planes
//
// ========================================================================================
//
// Each sample's block of `n_block` calls becomes two planes of `n_block` bits, stored as
// `u64` words with plane A immediately followed by plane B. Bit `k` of word `w` holds
// locus `64 * w + k`. The kernel only combines words with bitwise operators and
// popcounts, so the numeric order of bits inside a word never matters.

use crate::error::BetaError;
use crate::types::{BLOCK_ALIGNMENT, Genotype, LOCI_PER_WORD};

/// A reusable, sample-major buffer of packed genotype planes for one block.
#[derive(Debug, Clone)]
pub struct PackedBlock {
    n_samples: usize,
    n_block: usize,
    words_per_plane: usize,
    words: Vec<u64>,
}

impl PackedBlock {
    /// Allocates a block for `n_samples` samples of `n_block` loci each.
    ///
    /// `n_block` must be a positive multiple of 128.
    pub fn new(n_samples: usize, n_block: usize) -> Result<Self, BetaError> {
        if n_block == 0 || n_block % BLOCK_ALIGNMENT != 0 {
            return Err(BetaError::InvalidConfig(format!(
                "packed block size {n_block} is not a positive multiple of {BLOCK_ALIGNMENT}"
            )));
        }
        let words_per_plane = n_block / LOCI_PER_WORD;
        let len = n_samples * words_per_plane * 2;
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| BetaError::Allocation {
                what: "packed genotype block",
                bytes: len.saturating_mul(std::mem::size_of::<u64>()),
            })?;
        words.resize(len, 0);
        Ok(Self {
            n_samples,
            n_block,
            words_per_plane,
            words,
        })
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Loci per block, always a multiple of 128.
    #[inline]
    pub fn n_block(&self) -> usize {
        self.n_block
    }

    #[inline]
    pub fn words_per_plane(&self) -> usize {
        self.words_per_plane
    }

    /// Plane A and plane B of one sample.
    #[inline(always)]
    pub fn planes(&self, sample: usize) -> (&[u64], &[u64]) {
        let stride = self.words_per_plane * 2;
        let start = sample * stride;
        self.words[start..start + stride].split_at(self.words_per_plane)
    }

    /// Packs `filled` loci per sample from a sample-major raw buffer whose rows are
    /// `row_stride` bytes apart. Loci in `filled..n_block` are packed as missing.
    pub fn pack(&mut self, raw: &[u8], row_stride: usize, filled: usize) {
        debug_assert!(filled <= self.n_block && filled <= row_stride);
        debug_assert!(raw.len() >= (self.n_samples.max(1) - 1) * row_stride + filled);
        let stride = self.words_per_plane * 2;
        for (sample, planes) in self.words.chunks_exact_mut(stride).enumerate() {
            let row = &raw[sample * row_stride..sample * row_stride + filled];
            let (plane_a, plane_b) = planes.split_at_mut(self.words_per_plane);
            pack_row(row, plane_a, plane_b);
        }
    }
}

/// Packs one sample's calls into its two planes, padding the tail as missing.
fn pack_row(row: &[u8], plane_a: &mut [u64], plane_b: &mut [u64]) {
    let mut chunks = row.chunks(LOCI_PER_WORD);
    for (a_word, b_word) in plane_a.iter_mut().zip(plane_b.iter_mut()) {
        let (a, b) = match chunks.next() {
            Some(chunk) => pack_word(chunk),
            None => (0, u64::MAX),
        };
        *a_word = a;
        *b_word = b;
    }
}

/// Packs up to 64 calls into one (A, B) word pair. Positions past `calls.len()`
/// encode a missing call.
#[inline(always)]
fn pack_word(calls: &[u8]) -> (u64, u64) {
    let mut a = 0u64;
    let mut b = if calls.len() == LOCI_PER_WORD {
        0
    } else {
        u64::MAX << calls.len()
    };
    for (bit, &raw) in calls.iter().enumerate() {
        let (bit_a, bit_b) = Genotype::from_raw(raw).plane_bits();
        a |= (bit_a as u64) << bit;
        b |= (bit_b as u64) << bit;
    }
    (a, b)
}
