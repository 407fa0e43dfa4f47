#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
// ========================================================================================
//
//                    Relate: pairwise IBS beta relatedness from SNP genotypes
//
// ========================================================================================
//
// Genotype blocks are streamed from a `GenotypeBlockSource`, packed into bit planes, and
// folded into one identity-by-state counter per sample pair by a fixed pool of workers.
// After the last block the counters are centered into the beta relatedness matrix.
pub mod config;
pub mod error;
pub mod kernel;
pub mod normalize;
pub mod pack;
pub mod partition;
pub mod progress;
pub mod scheduler;
pub mod source;
pub mod triangle;
pub mod types;

pub use config::{BetaConfig, DiagonalMode};
pub use error::BetaError;
pub use normalize::{NormalizedBeta, normalize_beta};
pub use progress::{BetaProgressObserver, ConsoleProgress, NoopProgress};
pub use scheduler::{IbsAccumulation, accumulate_ibs_counts};
pub use source::{DenseGenotypeSource, GenotypeBlockSource};
pub use types::{MISSING_GENOTYPE, PairCounts};

use ndarray::{Array2, ArrayView1};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// The outcome of a complete relatedness run.
#[derive(Debug, Clone)]
pub struct BetaResult {
    /// Symmetric `N x N` beta matrix. The diagonal follows [`DiagonalMode`].
    pub matrix: Array2<f64>,
    /// Mean raw off-diagonal IBS proportion used for centering.
    pub average: f64,
    pub n_loci: usize,
    pub block_size: usize,
}

impl BetaResult {
    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    /// The diagonal of the matrix, one value per sample.
    pub fn inbreeding(&self) -> ArrayView1<'_, f64> {
        self.matrix.diag()
    }
}

/// Configured entry point for relatedness runs.
pub struct BetaEstimator {
    config: BetaConfig,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<Box<dyn BetaProgressObserver>>,
}

impl BetaEstimator {
    pub fn new(config: BetaConfig) -> Self {
        Self {
            config,
            cancel: None,
            progress: None,
        }
    }

    /// Stops the run at the next block boundary once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Routes progress to a caller-supplied observer instead of the default.
    pub fn with_progress(mut self, observer: Box<dyn BetaProgressObserver>) -> Self {
        self.progress = Some(observer);
        self
    }

    pub fn config(&self) -> &BetaConfig {
        &self.config
    }

    /// Streams `source` to the end and returns the normalized beta matrix.
    pub fn run<S>(&self, source: &mut S) -> Result<BetaResult, BetaError>
    where
        S: GenotypeBlockSource + ?Sized,
    {
        let start_time = Instant::now();
        let console;
        let progress: &dyn BetaProgressObserver = match (&self.progress, self.config.verbose) {
            (Some(observer), _) => observer.as_ref(),
            (None, true) => {
                console = ConsoleProgress::new();
                &console
            }
            (None, false) => &NoopProgress,
        };

        let accumulation =
            accumulate_ibs_counts(source, &self.config, progress, self.cancel.as_deref())?;
        let normalized = normalize_beta(
            &accumulation.counts,
            accumulation.loci_processed,
            self.config.diagonal,
        )?;

        if self.config.verbose {
            log::info!(
                "IBS beta: done in {:.2?} (mean off-diagonal IBS {:.6})",
                start_time.elapsed(),
                normalized.average
            );
        }

        Ok(BetaResult {
            matrix: normalized.matrix,
            average: normalized.average,
            n_loci: accumulation.loci_processed,
            block_size: accumulation.block_size,
        })
    }
}

/// Computes the `N x N` beta relatedness matrix of every sample in `source`.
///
/// The result depends only on the genotypes; `threads` (clamped to at least one) and
/// the block size chosen internally affect speed alone.
pub fn compute_beta_relatedness<S>(
    source: &mut S,
    threads: usize,
    verbose: bool,
) -> Result<Array2<f64>, BetaError>
where
    S: GenotypeBlockSource + ?Sized,
{
    BetaEstimator::new(BetaConfig::new(threads, verbose))
        .run(source)
        .map(|result| result.matrix)
}
