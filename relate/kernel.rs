// ========================================================================================
//
//                   The kernel: branch-free IBS counting over bit planes
//
// ========================================================================================
//
// This module contains the innermost loop of the engine. For a contiguous run of sample
// pairs it combines the packed planes of both samples 64 loci at a time and folds the
// result into each pair's counters with popcounts. It allocates nothing and contains no
// data-dependent branches inside the word loops.

use crate::pack::PackedBlock;
use crate::partition::PairRange;
use crate::types::PairCounts;

/// IBS score and valid-locus count for two different samples over one block.
///
/// Per word:
/// * `mask` is set where both samples are called.
/// * `het` is set where at least one sample is heterozygous (one shared allele).
/// * `ibs2` is set where both samples carry the same homozygous call.
///
/// The score adds `popcount(het & mask) + 2 * popcount(ibs2 & mask)`.
#[inline(always)]
pub fn ibs_pair_words(a1: &[u64], b1: &[u64], a2: &[u64], b2: &[u64]) -> (u32, u32) {
    let mut ibscnt = 0u32;
    let mut num = 0u32;
    for (((&g1_1, &g1_2), &g2_1), &g2_2) in a1.iter().zip(b1).zip(a2).zip(b2) {
        let mask = (g1_1 | !g1_2) & (g2_1 | !g2_2);
        let het = (g1_1 ^ g1_2) | (g2_1 ^ g2_2);
        let ibs2 = !(het | (g1_1 ^ g2_1));
        ibscnt += (het & mask).count_ones() + 2 * (ibs2 & mask).count_ones();
        num += mask.count_ones();
    }
    (ibscnt, num)
}

/// Self-comparison score and valid-locus count for one sample over one block.
///
/// The score counts called homozygous loci.
#[inline(always)]
pub fn ibs_self_words(a: &[u64], b: &[u64]) -> (u32, u32) {
    let mut ibscnt = 0u32;
    let mut num = 0u32;
    for (&g1, &g2) in a.iter().zip(b) {
        let mask = g1 | !g2;
        ibscnt += (!(g1 ^ g2) & mask).count_ones();
        num += mask.count_ones();
    }
    (ibscnt, num)
}

/// Adds one block's contribution to every pair of `range`.
///
/// `counts` is the range's own slice of the triangular counter array, so
/// `counts[k]` belongs to the `k`-th pair of the range.
pub fn accumulate_range(block: &PackedBlock, range: &PairRange, counts: &mut [PairCounts]) {
    debug_assert_eq!(counts.len(), range.len);
    for (pair, counter) in range.pairs(block.n_samples()).zip(counts.iter_mut()) {
        let (a1, b1) = block.planes(pair.row);
        let (ibscnt, num) = if pair.is_diagonal() {
            ibs_self_words(a1, b1)
        } else {
            let (a2, b2) = block.planes(pair.column);
            ibs_pair_words(a1, b1, a2, b2)
        };
        counter.add(ibscnt, num);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::split_pair_space;
    use crate::triangle::pair_count;
    use crate::types::MISSING_GENOTYPE;

    fn pack(rows: &[&[u8]]) -> PackedBlock {
        let stride = rows[0].len();
        let mut block = PackedBlock::new(rows.len(), 128).unwrap();
        let raw: Vec<u8> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        block.pack(&raw, stride, stride);
        block
    }

    fn pair_of(g1: u8, g2: u8) -> (u32, u32) {
        let block = pack(&[&[g1], &[g2]]);
        let (a1, b1) = block.planes(0);
        let (a2, b2) = block.planes(1);
        ibs_pair_words(a1, b1, a2, b2)
    }

    #[test]
    fn truth_table_for_every_call_combination() {
        const M: u8 = MISSING_GENOTYPE;
        let expected = [
            (0, 0, (2, 1)),
            (0, 1, (1, 1)),
            (0, 2, (0, 1)),
            (1, 0, (1, 1)),
            (1, 1, (1, 1)),
            (1, 2, (1, 1)),
            (2, 0, (0, 1)),
            (2, 1, (1, 1)),
            (2, 2, (2, 1)),
        ];
        for (g1, g2, counts) in expected {
            assert_eq!(pair_of(g1, g2), counts, "calls {g1} and {g2}");
        }
        for g in [0, 1, 2, M] {
            assert_eq!(pair_of(g, M), (0, 0));
            assert_eq!(pair_of(M, g), (0, 0));
        }
    }

    #[test]
    fn diagonal_counts_called_homozygotes() {
        let block = pack(&[&[0, 1, 2, MISSING_GENOTYPE, 2, 1]]);
        let (a, b) = block.planes(0);
        assert_eq!(ibs_self_words(a, b), (3, 5));
    }

    #[test]
    fn known_two_sample_case() {
        let block = pack(&[&[0, 1, 2, 0], &[0, 1, 2, 2]]);
        let (a1, b1) = block.planes(0);
        let (a2, b2) = block.planes(1);
        // Loci 0 and 2 match homozygous (2 each), locus 1 is het/het (1), locus 3 is 0 vs 2.
        assert_eq!(ibs_pair_words(a1, b1, a2, b2), (5, 4));
    }

    #[test]
    fn self_pair_through_off_diagonal_path_matches_identity() {
        let row = [0u8, 1, 2, 2, 0, 1, 1, 0];
        let block = pack(&[&row, &row]);
        let (a1, b1) = block.planes(0);
        let (a2, b2) = block.planes(1);
        let (off_ibs, off_num) = ibs_pair_words(a1, b1, a2, b2);
        let (self_ibs, self_num) = ibs_self_words(a1, b1);
        assert_eq!(off_num, self_num);
        // Off the diagonal a homozygote scores 2 and a heterozygote 1; on it a
        // homozygote scores 1 and a heterozygote 0.
        let hets = row.iter().filter(|&&g| g == 1).count() as u32;
        assert_eq!(off_ibs, 2 * self_ibs + hets);
    }

    #[test]
    fn accumulate_range_updates_only_its_slice() {
        let block = pack(&[&[0, 1, 2], &[0, 0, 0], &[2, 2, 2]]);
        let n = 3;
        let ranges = split_pair_space(2, n);
        let mut counts = vec![PairCounts::default(); pair_count(n)];
        let second = ranges[1];
        accumulate_range(&block, &second, &mut counts[second.offsets()]);
        assert!(counts[ranges[0].offsets()].iter().all(|c| *c == PairCounts::default()));
        // Storage order: (0,0) (0,1) (0,2) | (1,1) (1,2) (2,2)
        assert_eq!(counts[3], PairCounts { ibscnt: 3, num: 3 });
        assert_eq!(counts[4], PairCounts { ibscnt: 0, num: 3 });
        assert_eq!(counts[5], PairCounts { ibscnt: 3, num: 3 });
    }
}
