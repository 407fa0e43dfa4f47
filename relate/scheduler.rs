// ========================================================================================
//
//                 The block scheduler: stream, pack, fork/join, repeat
//
// ========================================================================================
//
// The calling thread owns all I/O and packing. For each block it reads raw genotypes
// from the source, packs them into the shared bit-plane buffer, then hands every worker
// its fixed range of pairs and waits for all of them before touching the buffer again.
//
// The counter array is split at range boundaries into disjoint mutable slices before
// each dispatch, so no two workers can ever reach the same counter and no locking is
// needed. The packed block is only borrowed immutably while workers run.

use crate::config::BetaConfig;
use crate::error::BetaError;
use crate::kernel;
use crate::pack::PackedBlock;
use crate::partition::{PairRange, split_pair_space};
use crate::progress::BetaProgressObserver;
use crate::source::GenotypeBlockSource;
use crate::triangle::TriangularMatrix;
use crate::types::PairCounts;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Largest locus total whose doubled IBS score still fits the 32-bit counters.
const MAX_TOTAL_LOCI: usize = (u32::MAX / 2) as usize;

/// Pair counters after the final block, plus the facts needed to interpret them.
#[derive(Debug, Clone)]
pub struct IbsAccumulation {
    pub counts: TriangularMatrix<PairCounts>,
    pub loci_processed: usize,
    pub block_size: usize,
}

/// The raw and packed buffers reused across every block of one run.
pub struct BlockBuffers {
    raw: Vec<u8>,
    packed: PackedBlock,
}

impl BlockBuffers {
    pub fn new(n_samples: usize, n_block: usize) -> Result<Self, BetaError> {
        let packed = PackedBlock::new(n_samples, n_block)?;
        let len = n_samples.saturating_mul(n_block);
        let mut raw = Vec::new();
        raw.try_reserve_exact(len)
            .map_err(|_| BetaError::Allocation {
                what: "raw genotype block",
                bytes: len,
            })?;
        raw.resize(len, 0);
        Ok(Self { raw, packed })
    }

    pub fn n_block(&self) -> usize {
        self.packed.n_block()
    }

    /// Pulls the next block from `source` and packs it. Returns the loci read.
    fn load_next<S>(&mut self, source: &mut S) -> Result<usize, BetaError>
    where
        S: GenotypeBlockSource + ?Sized,
    {
        let n_block = self.n_block();
        let filled = source
            .next_block_into(n_block, &mut self.raw)
            .map_err(BetaError::from_source)?;
        if filled > n_block {
            return Err(BetaError::SourceOverrun {
                expected: n_block,
                actual: filled,
            });
        }
        if filled > 0 {
            self.packed.pack(&self.raw, n_block, filled);
        }
        Ok(filled)
    }
}

/// Splits the counter array into one disjoint mutable slice per range.
fn split_by_ranges<'c, 'r>(
    mut counts: &'c mut [PairCounts],
    ranges: &'r [PairRange],
) -> Vec<(&'r PairRange, &'c mut [PairCounts])> {
    let mut parts = Vec::with_capacity(ranges.len());
    let mut consumed = 0;
    for range in ranges {
        let offsets = range.offsets();
        debug_assert_eq!(offsets.start, consumed, "pair ranges must be contiguous");
        let (head, tail) = counts.split_at_mut(offsets.len());
        parts.push((range, head));
        counts = tail;
        consumed = offsets.end;
    }
    debug_assert!(counts.is_empty());
    parts
}

/// Runs the kernel for one packed block over every range and waits for completion.
fn dispatch_block(
    pool: &ThreadPool,
    packed: &PackedBlock,
    ranges: &[PairRange],
    counts: &mut TriangularMatrix<PairCounts>,
) {
    let parts = split_by_ranges(counts.as_mut_slice(), ranges);
    pool.install(|| {
        parts
            .into_par_iter()
            .for_each(|(range, slice)| kernel::accumulate_range(packed, range, slice));
    });
}

/// Streams every block of `source` through the kernel and returns the frozen counters.
///
/// `cancel` is polled before each block; when set the run stops with
/// [`BetaError::Cancelled`].
pub fn accumulate_ibs_counts<S>(
    source: &mut S,
    config: &BetaConfig,
    progress: &dyn BetaProgressObserver,
    cancel: Option<&AtomicBool>,
) -> Result<IbsAccumulation, BetaError>
where
    S: GenotypeBlockSource + ?Sized,
{
    accumulate_with_limit(source, config, progress, cancel, MAX_TOTAL_LOCI)
}

/// The block loop proper. Fails with [`BetaError::CounterOverflow`] before dispatching
/// a block that would take the locus total past `max_total_loci`.
fn accumulate_with_limit<S>(
    source: &mut S,
    config: &BetaConfig,
    progress: &dyn BetaProgressObserver,
    cancel: Option<&AtomicBool>,
    max_total_loci: usize,
) -> Result<IbsAccumulation, BetaError>
where
    S: GenotypeBlockSource + ?Sized,
{
    config.validate()?;
    let n_samples = source.n_samples();
    if n_samples == 0 {
        return Err(BetaError::NoSamples);
    }

    let n_threads = config.effective_threads();
    let n_block = config.block_size_for(n_samples);
    log::info!(
        "IBS beta: {n_samples} samples, {n_threads} threads (internal increment: {n_block})"
    );

    let mut counts = TriangularMatrix::<PairCounts>::zeroed(n_samples)?;
    let ranges = split_pair_space(n_threads, n_samples);
    let pool = ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .thread_name(|i| format!("relate-ibs-{i}"))
        .build()?;
    let mut buffers = BlockBuffers::new(n_samples, n_block)?;

    source.reset().map_err(BetaError::from_source)?;
    let total_hint = source.n_loci_hint();
    progress.on_start(total_hint, n_block);

    let start_time = Instant::now();
    let mut processed = 0usize;
    loop {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            log::warn!("IBS beta cancelled after {processed} loci");
            return Err(BetaError::Cancelled {
                loci_processed: processed,
            });
        }

        let filled = buffers.load_next(source)?;
        if filled == 0 {
            break;
        }
        if source.n_samples() != n_samples {
            return Err(BetaError::SourceShape {
                expected: n_samples,
                actual: source.n_samples(),
            });
        }
        if processed + filled > max_total_loci {
            return Err(BetaError::CounterOverflow {
                loci_processed: processed + filled,
            });
        }

        dispatch_block(&pool, &buffers.packed, &ranges, &mut counts);
        processed += filled;
        log::debug!("IBS beta: block of {filled} loci done, {processed} total");

        match source.progress_loci() {
            Some((done, total)) => progress.on_block(done, total.or(total_hint)),
            None => progress.on_block(processed, total_hint),
        }
    }

    if processed == 0 {
        return Err(BetaError::NoLoci);
    }
    progress.on_finish(processed);
    log::info!(
        "IBS beta: accumulated {processed} loci in {:.2?}",
        start_time.elapsed()
    );

    Ok(IbsAccumulation {
        counts,
        loci_processed: processed,
        block_size: buffers.n_block(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use crate::source::DenseGenotypeSource;
    use crate::triangle::pair_count;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::RefCell;

    fn config(threads: usize, block_size: usize) -> BetaConfig {
        BetaConfig {
            threads,
            block_size: Some(block_size),
            ..BetaConfig::default()
        }
    }

    fn random_genotypes(n_samples: usize, n_loci: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n_samples * n_loci).map(|_| rng.gen_range(0..4u8)).collect()
    }

    #[test]
    fn split_by_ranges_yields_disjoint_cover() {
        let ranges = split_pair_space(3, 5);
        let mut counts = vec![PairCounts::default(); pair_count(5)];
        let parts = split_by_ranges(&mut counts, &ranges);
        assert_eq!(parts.len(), 3);
        let lens: usize = parts.iter().map(|(_, s)| s.len()).sum();
        assert_eq!(lens, 15);
        for (range, slice) in &parts {
            assert_eq!(range.len, slice.len());
        }
    }

    #[test]
    fn known_small_case_counts() {
        let data = [0u8, 1, 2, 0, 0, 1, 2, 2];
        let mut source = DenseGenotypeSource::new(&data, 2, 4).unwrap();
        let result = accumulate_ibs_counts(&mut source, &config(2, 256), &NoopProgress, None).unwrap();
        assert_eq!(result.loci_processed, 4);
        assert_eq!(result.block_size, 256);
        assert_eq!(result.counts.get(0, 1), PairCounts { ibscnt: 5, num: 4 });
        assert_eq!(result.counts.get(0, 0), PairCounts { ibscnt: 3, num: 4 });
        assert_eq!(result.counts.get(1, 1), PairCounts { ibscnt: 3, num: 4 });
    }

    #[test]
    fn counts_do_not_depend_on_block_size_or_threads() {
        let (n, m) = (9, 1000);
        let data = random_genotypes(n, m, 7);
        let run = |threads, block| {
            let mut source = DenseGenotypeSource::new(&data, n, m).unwrap();
            accumulate_ibs_counts(&mut source, &config(threads, block), &NoopProgress, None)
                .unwrap()
                .counts
        };
        let reference = run(1, 65_536);
        for (threads, block) in [(1, 256), (2, 384), (4, 512), (8, 256), (3, 1024)] {
            assert_eq!(run(threads, block), reference, "threads={threads} block={block}");
        }
    }

    #[test]
    fn empty_source_is_an_error() {
        let data: [u8; 0] = [];
        let mut source = DenseGenotypeSource::new(&data, 3, 0).unwrap();
        assert!(matches!(
            accumulate_ibs_counts(&mut source, &config(1, 256), &NoopProgress, None),
            Err(BetaError::NoLoci)
        ));
    }

    #[test]
    fn cancellation_is_checked_at_block_boundaries() {
        let data = vec![1u8; 2 * 600];
        let mut source = DenseGenotypeSource::new(&data, 2, 600).unwrap();
        let flag = AtomicBool::new(true);
        assert!(matches!(
            accumulate_ibs_counts(&mut source, &config(1, 256), &NoopProgress, Some(&flag)),
            Err(BetaError::Cancelled { loci_processed: 0 })
        ));
    }

    struct Recorder {
        events: RefCell<Vec<(usize, Option<usize>)>>,
    }

    impl BetaProgressObserver for Recorder {
        fn on_block(&self, processed_loci: usize, total_loci: Option<usize>) {
            self.events.borrow_mut().push((processed_loci, total_loci));
        }
    }

    #[test]
    fn progress_is_reported_per_block() {
        let data = vec![0u8; 3 * 600];
        let mut source = DenseGenotypeSource::new(&data, 3, 600).unwrap();
        let recorder = Recorder {
            events: RefCell::new(Vec::new()),
        };
        accumulate_ibs_counts(&mut source, &config(2, 256), &recorder, None).unwrap();
        assert_eq!(
            recorder.events.into_inner(),
            vec![(256, Some(600)), (512, Some(600)), (600, Some(600))]
        );
    }

    #[test]
    fn buffers_are_sized_for_one_full_block() {
        let buffers = BlockBuffers::new(4, 512).unwrap();
        assert_eq!(buffers.n_block(), 512);
        assert_eq!(buffers.raw.len(), 4 * 512);
        assert_eq!(buffers.packed.n_block(), 512);
    }

    #[test]
    fn locus_total_past_the_counter_limit_fails_before_dispatch() {
        let data = vec![2u8; 2 * 600];
        let mut source = DenseGenotypeSource::new(&data, 2, 600).unwrap();
        let recorder = Recorder {
            events: RefCell::new(Vec::new()),
        };
        match accumulate_with_limit(&mut source, &config(1, 256), &recorder, None, 300) {
            Err(BetaError::CounterOverflow { loci_processed }) => assert_eq!(loci_processed, 512),
            other => panic!("expected counter overflow, got {other:?}"),
        }
        // Only the first block made it through the kernel.
        assert_eq!(recorder.events.into_inner(), vec![(256, Some(600))]);
    }

    #[test]
    fn locus_total_at_the_counter_limit_is_accepted() {
        let data = vec![2u8; 2 * 600];
        let mut source = DenseGenotypeSource::new(&data, 2, 600).unwrap();
        let result =
            accumulate_with_limit(&mut source, &config(2, 256), &NoopProgress, None, 600).unwrap();
        assert_eq!(result.loci_processed, 600);
        assert_eq!(result.counts.get(0, 1), PairCounts { ibscnt: 1200, num: 600 });
    }

    #[test]
    fn default_limit_keeps_doubled_scores_in_u32() {
        assert!(2 * MAX_TOTAL_LOCI as u64 <= u64::from(u32::MAX));
        assert!(2 * (MAX_TOTAL_LOCI as u64 + 1) > u64::from(u32::MAX));
    }
}
