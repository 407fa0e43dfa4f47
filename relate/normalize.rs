// ========================================================================================
//                     Two-pass centering of IBS counts into beta values
// ========================================================================================
//
// Pass one turns every pair's counters into a raw matching proportion and averages the
// off-diagonal proportions. Pass two centers and scales every entry by that average:
//
//     beta = (raw - avg) / (1 - avg)
//
// The pass order is fixed and sequential so the output is bit-for-bit reproducible.

use crate::config::DiagonalMode;
use crate::error::BetaError;
use crate::triangle::TriangularMatrix;
use crate::types::PairCounts;
use ndarray::Array2;

/// A finished relatedness matrix together with the centering constant.
#[derive(Debug, Clone)]
pub struct NormalizedBeta {
    pub matrix: Array2<f64>,
    /// Mean raw off-diagonal matching proportion.
    pub average: f64,
}

/// Converts frozen pair counters into the symmetric beta matrix.
///
/// Fails if any pair never had a locus called in both samples, or if the mean
/// off-diagonal proportion is 1 so that the scale is undefined. `loci_processed`
/// is only used for error context.
pub fn normalize_beta(
    counts: &TriangularMatrix<PairCounts>,
    loci_processed: usize,
    diagonal: DiagonalMode,
) -> Result<NormalizedBeta, BetaError> {
    let n = counts.dim();
    let len = n.saturating_mul(n);
    let mut storage: Vec<f64> = Vec::new();
    storage
        .try_reserve_exact(len)
        .map_err(|_| BetaError::Allocation {
            what: "relatedness matrix",
            bytes: len.saturating_mul(std::mem::size_of::<f64>()),
        })?;
    storage.resize(len, 0.0);
    let mut matrix = Array2::from_shape_vec((n, n), storage)
        .map_err(|e| BetaError::InvalidConfig(format!("relatedness matrix shape: {e}")))?;

    // Pass one: raw proportions into the upper triangle, off-diagonal sum.
    let mut sum = 0.0f64;
    for (position, counter) in counts.iter() {
        if counter.num == 0 {
            return Err(BetaError::DegeneratePair {
                row: position.row,
                column: position.column,
                loci_processed,
            });
        }
        let (i, j) = (position.row, position.column);
        if position.is_diagonal() {
            matrix[[i, i]] = f64::from(counter.ibscnt) / f64::from(counter.num);
        } else {
            let s = (0.5 * f64::from(counter.ibscnt)) / f64::from(counter.num);
            matrix[[i, j]] = s;
            sum += s;
        }
    }

    let off_diagonal_pairs = n * n.saturating_sub(1) / 2;
    let average = if off_diagonal_pairs == 0 {
        0.0
    } else {
        sum / off_diagonal_pairs as f64
    };
    let bt = 1.0 / (1.0 - average);
    if !bt.is_finite() {
        return Err(BetaError::DegenerateCentering { average });
    }

    // Pass two: center, scale and mirror.
    for i in 0..n {
        let f = (matrix[[i, i]] - average) * bt;
        matrix[[i, i]] = match diagonal {
            DiagonalMode::Inbreeding => f,
            DiagonalMode::SelfRelatedness => 0.5 * (1.0 + f),
        };
        for j in i + 1..n {
            let s = (matrix[[i, j]] - average) * bt;
            matrix[[i, j]] = s;
            matrix[[j, i]] = s;
        }
    }

    Ok(NormalizedBeta { matrix, average })
}
