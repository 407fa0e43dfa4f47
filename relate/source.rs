use crate::error::BetaError;
use core::cmp::min;
use std::convert::Infallible;
use std::error::Error;

/// A stream of genotype blocks over successive ranges of loci.
///
/// Blocks are written sample-major: the call for `sample` at the `locus`-th position
/// of the block goes to `storage[sample * max_loci + locus]`. Values `0..=2` are
/// dosages; anything else is a missing call.
pub trait GenotypeBlockSource {
    type Error: Error + Send + Sync + 'static;

    fn n_samples(&self) -> usize;

    /// Total loci, when the source knows it up front.
    fn n_loci_hint(&self) -> Option<usize> {
        None
    }

    /// Rewinds the stream to the first locus.
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Fills up to `max_loci` loci into `storage` and returns how many were written.
    /// Zero means the stream is exhausted.
    fn next_block_into(&mut self, max_loci: usize, storage: &mut [u8]) -> Result<usize, Self::Error>;

    /// Loci consumed so far and, if known, the total.
    fn progress_loci(&self) -> Option<(usize, Option<usize>)> {
        let _ = self;
        None
    }
}

/// Streams an in-memory, sample-major genotype matrix (`n_samples` rows of `n_loci`).
pub struct DenseGenotypeSource<'a> {
    data: &'a [u8],
    dims: (usize, usize),
    cursor: usize,
}

impl<'a> DenseGenotypeSource<'a> {
    pub fn new(data: &'a [u8], n_samples: usize, n_loci: usize) -> Result<Self, BetaError> {
        if n_samples == 0 {
            return Err(BetaError::NoSamples);
        }
        let expected = n_samples.checked_mul(n_loci).ok_or_else(|| {
            BetaError::InvalidConfig("DenseGenotypeSource: dimension overflow".into())
        })?;
        if data.len() != expected {
            return Err(BetaError::InvalidConfig(format!(
                "DenseGenotypeSource: data length {} does not match {n_samples} samples x {n_loci} loci",
                data.len()
            )));
        }
        Ok(Self {
            data,
            dims: (n_samples, n_loci),
            cursor: 0,
        })
    }

    pub fn n_loci(&self) -> usize {
        self.dims.1
    }
}

impl<'a> GenotypeBlockSource for DenseGenotypeSource<'a> {
    type Error = Infallible;

    fn n_samples(&self) -> usize {
        self.dims.0
    }

    fn n_loci_hint(&self) -> Option<usize> {
        Some(self.n_loci())
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.cursor = 0;
        Ok(())
    }

    fn next_block_into(&mut self, max_loci: usize, storage: &mut [u8]) -> Result<usize, Self::Error> {
        let (n_samples, n_loci) = self.dims;
        let remaining = n_loci.saturating_sub(self.cursor);
        if max_loci == 0 || remaining == 0 {
            return Ok(0);
        }
        let ncols = min(max_loci, remaining);
        for sample in 0..n_samples {
            let src_start = sample * n_loci + self.cursor;
            let dst_start = sample * max_loci;
            storage[dst_start..dst_start + ncols]
                .copy_from_slice(&self.data[src_start..src_start + ncols]);
        }
        self.cursor += ncols;
        Ok(ncols)
    }

    fn progress_loci(&self) -> Option<(usize, Option<usize>)> {
        Some((self.cursor, Some(self.n_loci())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_dimensions() {
        let data = [0u8; 6];
        assert!(DenseGenotypeSource::new(&data, 2, 4).is_err());
        assert!(matches!(
            DenseGenotypeSource::new(&data, 0, 0),
            Err(BetaError::NoSamples)
        ));
        assert!(DenseGenotypeSource::new(&data, 2, 3).is_ok());
    }

    #[test]
    fn streams_sample_major_blocks_with_row_stride() {
        // Two samples, five loci.
        let data = [0u8, 1, 2, 0, 1, 2, 2, 1, 0, 3];
        let mut source = DenseGenotypeSource::new(&data, 2, 5).unwrap();
        let mut storage = vec![9u8; 2 * 3];

        assert_eq!(source.next_block_into(3, &mut storage).unwrap(), 3);
        assert_eq!(storage, vec![0, 1, 2, 2, 2, 1]);
        assert_eq!(source.progress_loci(), Some((3, Some(5))));

        assert_eq!(source.next_block_into(3, &mut storage).unwrap(), 2);
        assert_eq!(&storage[0..2], &[0, 1]);
        assert_eq!(&storage[3..5], &[0, 3]);

        assert_eq!(source.next_block_into(3, &mut storage).unwrap(), 0);

        source.reset().unwrap();
        assert_eq!(source.next_block_into(5, &mut vec![0; 10]).unwrap(), 5);
    }
}
