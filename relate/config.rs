use crate::error::BetaError;
use crate::types::{BLOCK_ALIGNMENT, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use serde::{Deserialize, Serialize};

/// Environment override for the fast-memory budget used to size blocks. Zero or an
/// unparsable value is ignored.
pub const CACHE_BYTES_ENV: &str = "RELATE_CACHE_BYTES";
const DEFAULT_CACHE_BYTES: usize = 1024 * 1024;
/// Block size is this many cache budgets divided by the sample count.
const CACHE_BUDGET_MULTIPLIER: usize = 4;

/// What the diagonal of the output matrix reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagonalMode {
    /// The centered self-comparison score, an individual inbreeding coefficient `F`.
    #[default]
    Inbreeding,
    /// The relatedness of a sample with itself, `(1 + F) / 2`.
    SelfRelatedness,
}

/// Tuning and output options for a relatedness run. Thread count and block size
/// only affect performance, never the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaConfig {
    pub threads: usize,
    pub verbose: bool,
    /// Loci per block. Derived from the cache budget when unset.
    pub block_size: Option<usize>,
    /// Fast-memory budget in bytes. Falls back to `RELATE_CACHE_BYTES`, then to the
    /// detected cache size.
    pub cache_bytes: Option<usize>,
    pub diagonal: DiagonalMode,
}

impl Default for BetaConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(1),
            verbose: false,
            block_size: None,
            cache_bytes: None,
            diagonal: DiagonalMode::default(),
        }
    }
}

impl BetaConfig {
    pub fn new(threads: usize, verbose: bool) -> Self {
        Self {
            threads,
            verbose,
            ..Self::default()
        }
    }

    /// Parses a TOML document; absent keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, BetaError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BetaError> {
        if self.cache_bytes == Some(0) {
            return Err(BetaError::InvalidConfig(
                "cache_bytes must be positive when set".into(),
            ));
        }
        if self.block_size == Some(0) {
            return Err(BetaError::InvalidConfig(
                "block_size must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// The worker count, clamped to at least one.
    pub fn effective_threads(&self) -> usize {
        if self.threads < 1 {
            log::warn!("Thread count {} is below 1; using a single thread", self.threads);
            1
        } else {
            self.threads
        }
    }

    /// The fast-memory budget used to size blocks.
    pub fn cache_budget_bytes(&self) -> usize {
        if let Some(bytes) = self.cache_bytes {
            return bytes;
        }
        match std::env::var(CACHE_BYTES_ENV) {
            Ok(value) => match value.parse::<u64>() {
                Ok(parsed) if parsed > 0 => usize::try_from(parsed).unwrap_or(usize::MAX),
                _ => detected_cache_bytes(),
            },
            Err(_) => detected_cache_bytes(),
        }
    }

    /// Loci per block for `n_samples` samples: a multiple of 128 within [256, 65536].
    pub fn block_size_for(&self, n_samples: usize) -> usize {
        match self.block_size {
            Some(requested) => {
                let resolved = align_block_size(requested);
                if resolved != requested {
                    log::warn!("Requested block size {requested} adjusted to {resolved} loci");
                }
                resolved
            }
            None => {
                let budget = self.cache_budget_bytes();
                align_block_size(
                    CACHE_BUDGET_MULTIPLIER.saturating_mul(budget) / n_samples.max(1),
                )
            }
        }
    }
}

fn detected_cache_bytes() -> usize {
    cache_size::l2_cache_size()
        .or_else(cache_size::l3_cache_size)
        .or_else(cache_size::l1_cache_size)
        .unwrap_or(DEFAULT_CACHE_BYTES)
}

/// Rounds down to a multiple of 128 loci and clamps into the supported range.
pub fn align_block_size(loci: usize) -> usize {
    (loci / BLOCK_ALIGNMENT * BLOCK_ALIGNMENT).clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
}
