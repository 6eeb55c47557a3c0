//! Sparse Distributed Representation (SDR) implementation.
//!
//! An SDR is a fixed-length binary vector stored as the sorted list of its
//! active bit indices. Once built an SDR is never modified: every pipeline
//! stage produces a fresh instance per observation.

use crate::error::{HtmError, Result};
use crate::types::{ElemSparse, Real};

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type alias for sparse SDR data (sorted indices of active bits).
pub type SdrSparse = Vec<ElemSparse>;

/// Sparse Distributed Representation.
///
/// Invariant: the active indices are unique, ascending and below `size`.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::types::Sdr;
///
/// let sdr = Sdr::from_sparse(100, vec![1, 4, 8, 15, 42]).unwrap();
/// assert_eq!(sdr.get_sum(), 5);
/// assert!(sdr.contains(42));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sdr {
    /// Total number of bits.
    size: usize,

    /// Sorted indices of active bits.
    sparse: SdrSparse,
}

impl Sdr {
    /// Creates an SDR of `size` bits with no active bits.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            sparse: Vec::new(),
        }
    }

    /// Creates an SDR from sorted, unique active indices.
    ///
    /// # Errors
    ///
    /// Returns an error if the indices are unsorted, duplicated or out of range.
    pub fn from_sparse(size: usize, sparse: SdrSparse) -> Result<Self> {
        Self::validate_sparse(size, &sparse)?;
        Ok(Self { size, sparse })
    }

    /// Creates an SDR from active indices in any order, dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if any index is out of range.
    pub fn from_unsorted(size: usize, mut sparse: SdrSparse) -> Result<Self> {
        sparse.sort_unstable();
        sparse.dedup();
        if let Some(&last) = sparse.last() {
            if last as usize >= size {
                return Err(HtmError::IndexOutOfBounds {
                    index: last as usize,
                    size,
                });
            }
        }
        Ok(Self { size, sparse })
    }

    /// Creates an SDR from a dense boolean slice.
    #[must_use]
    pub fn from_dense(dense: &[bool]) -> Self {
        let sparse = dense
            .iter()
            .enumerate()
            .filter(|(_, &bit)| bit)
            .map(|(i, _)| i as ElemSparse)
            .collect();
        Self {
            size: dense.len(),
            sparse,
        }
    }

    /// Creates an SDR without validating the indices.
    ///
    /// Callers inside the crate guarantee the invariant.
    pub(crate) fn from_sparse_unchecked(size: usize, sparse: SdrSparse) -> Self {
        debug_assert!(Self::validate_sparse(size, &sparse).is_ok());
        Self { size, sparse }
    }

    fn validate_sparse(size: usize, indices: &[ElemSparse]) -> Result<()> {
        for window in indices.windows(2) {
            if window[0] >= window[1] {
                return Err(HtmError::InvalidSdrData(format!(
                    "sparse indices must be ascending and unique, found {} before {}",
                    window[0], window[1]
                )));
            }
        }
        if let Some(&last) = indices.last() {
            if last as usize >= size {
                return Err(HtmError::IndexOutOfBounds {
                    index: last as usize,
                    size,
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the total number of bits.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the sorted active indices.
    #[must_use]
    pub fn get_sparse(&self) -> &[ElemSparse] {
        &self.sparse
    }

    /// Consumes the SDR, returning its active indices.
    #[must_use]
    pub fn into_sparse(self) -> SdrSparse {
        self.sparse
    }

    /// Returns a dense mask with `true` at every active bit.
    #[must_use]
    pub fn get_dense(&self) -> Vec<bool> {
        let mut dense = vec![false; self.size];
        for &idx in &self.sparse {
            dense[idx as usize] = true;
        }
        dense
    }

    /// Returns true if bit `index` is active.
    #[must_use]
    pub fn contains(&self, index: ElemSparse) -> bool {
        self.sparse.binary_search(&index).is_ok()
    }

    /// Returns true if no bit is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sparse.is_empty()
    }

    /// Returns the number of active (true) bits.
    #[must_use]
    pub fn get_sum(&self) -> usize {
        self.sparse.len()
    }

    /// Returns the sparsity (fraction of active bits).
    #[must_use]
    pub fn get_sparsity(&self) -> Real {
        if self.size == 0 {
            return 0.0;
        }
        self.get_sum() as Real / self.size as Real
    }

    /// Returns the number of bits that are active in both SDRs.
    #[must_use]
    pub fn get_overlap(&self, other: &Sdr) -> usize {
        let a = &self.sparse;
        let b = &other.sparse;

        let mut count = 0;
        let mut i = 0;
        let mut j = 0;

        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    count += 1;
                    i += 1;
                    j += 1;
                }
            }
        }

        count
    }

    // ========================================================================
    // SDR operations
    // ========================================================================

    /// Concatenates SDRs end to end. Each input's bits are shifted by the
    /// total size of the inputs before it.
    #[must_use]
    pub fn concatenate(inputs: &[&Sdr]) -> Sdr {
        let size = inputs.iter().map(|sdr| sdr.size).sum();
        let mut sparse = Vec::with_capacity(inputs.iter().map(|sdr| sdr.get_sum()).sum());
        let mut offset = 0;
        for sdr in inputs {
            sparse.extend(sdr.sparse.iter().map(|&idx| idx + offset as ElemSparse));
            offset += sdr.size;
        }
        Self::from_sparse_unchecked(size, sparse)
    }
}

impl fmt::Debug for Sdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Sdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SDR( {} ) ", self.size)?;
        for (i, idx) in self.sparse.iter().enumerate() {
            write!(f, "{idx}")?;
            if i + 1 != self.sparse.len() {
                write!(f, ", ")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor() {
        let sdr = Sdr::new(3);
        assert_eq!(sdr.size(), 3);
        assert!(sdr.is_empty());
    }

    #[test]
    fn test_from_sparse_validation() {
        assert!(Sdr::from_sparse(10, vec![1, 4, 8]).is_ok());
        assert!(matches!(
            Sdr::from_sparse(10, vec![4, 1]),
            Err(HtmError::InvalidSdrData(_))
        ));
        assert!(matches!(
            Sdr::from_sparse(10, vec![1, 1]),
            Err(HtmError::InvalidSdrData(_))
        ));
        assert!(matches!(
            Sdr::from_sparse(10, vec![1, 10]),
            Err(HtmError::IndexOutOfBounds { index: 10, size: 10 })
        ));
    }

    #[test]
    fn test_from_unsorted() {
        let sdr = Sdr::from_unsorted(10, vec![8, 1, 4, 1]).unwrap();
        assert_eq!(sdr.get_sparse(), &[1, 4, 8]);
        assert!(Sdr::from_unsorted(5, vec![7]).is_err());
    }

    #[test]
    fn test_dense_sparse_conversion() {
        let sdr = Sdr::from_dense(&[false, true, false, false, true, false, false, false, true]);
        assert_eq!(sdr.get_sparse(), &[1, 4, 8]);
        assert_eq!(
            sdr.get_dense(),
            vec![false, true, false, false, true, false, false, false, true]
        );
    }

    #[test]
    fn test_sum_sparsity() {
        let sdr = Sdr::from_sparse(10, vec![0, 5]).unwrap();
        assert_eq!(sdr.get_sum(), 2);
        assert!((sdr.get_sparsity() - 0.2).abs() < 1e-6);
        assert_eq!(Sdr::new(0).get_sparsity(), 0.0);
    }

    #[test]
    fn test_overlap() {
        let a = Sdr::from_sparse(10, vec![1, 2, 3, 7]).unwrap();
        let b = Sdr::from_sparse(10, vec![2, 3, 4, 9]).unwrap();
        assert_eq!(a.get_overlap(&b), 2);
        assert_eq!(b.get_overlap(&a), 2);
    }

    #[test]
    fn test_concatenate() {
        let a = Sdr::from_sparse(5, vec![0, 4]).unwrap();
        let b = Sdr::from_sparse(3, vec![1]).unwrap();
        let c = Sdr::new(2);
        let joined = Sdr::concatenate(&[&a, &b, &c]);
        assert_eq!(joined.size(), 10);
        assert_eq!(joined.get_sparse(), &[0, 4, 6]);
    }

    #[test]
    fn test_display() {
        let sdr = Sdr::from_sparse(10, vec![1, 4]).unwrap();
        assert_eq!(format!("{sdr}"), "SDR( 10 ) 1, 4");
    }
}
