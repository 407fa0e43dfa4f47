use std::error::Error;
use thiserror::Error;

/// Every way a relatedness run can fail. No partial results accompany an error.
#[derive(Debug, Error)]
pub enum BetaError {
    #[error("genotype source reports zero samples")]
    NoSamples,
    #[error("genotype source yielded no loci; the beta estimator needs at least one locus")]
    NoLoci,
    #[error(
        "no locus was called in both samples of pair {row} and {column} after {loci_processed} loci; relatedness is undefined for this pair"
    )]
    DegeneratePair {
        row: usize,
        column: usize,
        loci_processed: usize,
    },
    #[error(
        "mean off-diagonal IBS score is {average}; every pair is identical by state and the beta scale 1/(1 - mean) is undefined"
    )]
    DegenerateCentering { average: f64 },
    #[error("failed to allocate {bytes} bytes for {what}")]
    Allocation { what: &'static str, bytes: usize },
    #[error("{loci_processed} loci would overflow the 32-bit pair counters")]
    CounterOverflow { loci_processed: usize },
    #[error("genotype source returned {actual} loci for a block of at most {expected}")]
    SourceOverrun { expected: usize, actual: usize },
    #[error("genotype source reported {actual} samples after starting with {expected}")]
    SourceShape { expected: usize, actual: usize },
    #[error("genotype source error: {0}")]
    Source(#[source] Box<dyn Error + Send + Sync + 'static>),
    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("computation cancelled after {loci_processed} loci")]
    Cancelled { loci_processed: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl BetaError {
    pub(crate) fn from_source<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(err))
    }
}
