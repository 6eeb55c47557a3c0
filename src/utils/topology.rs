//! Topology of the column and input spaces.
//!
//! Both spaces are one-dimensional. With wrapping enabled they are rings:
//! index 0 and index `size - 1` are neighbors.

use crate::types::UInt;

/// Specifies how boundaries are handled in topological computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrappingMode {
    /// No wrapping - boundaries are hard limits.
    NoWrap,
    /// Wrap around - the space is a ring.
    #[default]
    Wrap,
}

impl From<bool> for WrappingMode {
    fn from(wrap: bool) -> Self {
        if wrap {
            Self::Wrap
        } else {
            Self::NoWrap
        }
    }
}

/// Utilities for computing topological relationships.
pub struct Topology;

impl Topology {
    /// Computes the neighborhood of a point within a given radius.
    ///
    /// The result is sorted ascending and never contains duplicates, even when
    /// a wrapped radius covers the whole ring.
    ///
    /// # Example
    ///
    /// ```rust
    /// use htm_anomaly::utils::{Topology, WrappingMode};
    ///
    /// let ring = Topology::neighborhood(0, 10, 2, WrappingMode::Wrap, true);
    /// assert_eq!(ring, vec![0, 1, 2, 8, 9]);
    /// ```
    #[must_use]
    pub fn neighborhood(
        center: usize,
        size: usize,
        radius: UInt,
        wrap: WrappingMode,
        include_center: bool,
    ) -> Vec<usize> {
        if size == 0 {
            return Vec::new();
        }
        let radius = radius as usize;

        let mut neighbors: Vec<usize> = if 2 * radius + 1 >= size {
            match wrap {
                WrappingMode::Wrap => (0..size).collect(),
                WrappingMode::NoWrap => {
                    let lo = center.saturating_sub(radius);
                    let hi = (center + radius).min(size - 1);
                    (lo..=hi).collect()
                }
            }
        } else {
            match wrap {
                WrappingMode::Wrap => {
                    let mut ring: Vec<usize> = (0..=2 * radius)
                        .map(|offset| (center + size + offset - radius) % size)
                        .collect();
                    ring.sort_unstable();
                    ring
                }
                WrappingMode::NoWrap => {
                    let lo = center.saturating_sub(radius);
                    let hi = (center + radius).min(size - 1);
                    (lo..=hi).collect()
                }
            }
        };

        if !include_center {
            neighbors.retain(|&idx| idx != center);
        }
        neighbors
    }

    /// Maps a column index to the input index at the center of its
    /// receptive field, spreading columns uniformly over the input.
    #[must_use]
    pub fn map_column_to_input(column: usize, num_columns: usize, num_inputs: usize) -> usize {
        if num_columns == 0 || num_inputs == 0 {
            return 0;
        }
        let ratio = num_inputs as f64 / num_columns as f64;
        let input = ((column as f64 + 0.5) * ratio) as usize;
        input.min(num_inputs - 1)
    }

    /// Computes the input indices a column may ever connect to.
    #[must_use]
    pub fn map_potential_pool(
        column: usize,
        num_columns: usize,
        num_inputs: usize,
        potential_radius: UInt,
        wrap: WrappingMode,
    ) -> Vec<usize> {
        let center = Self::map_column_to_input(column, num_columns, num_inputs);
        Self::neighborhood(center, num_inputs, potential_radius, wrap, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighborhood_1d() {
        let neighbors = Topology::neighborhood(5, 10, 2, WrappingMode::NoWrap, true);
        assert_eq!(neighbors, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_neighborhood_boundary() {
        let neighbors = Topology::neighborhood(0, 10, 2, WrappingMode::NoWrap, true);
        assert_eq!(neighbors, vec![0, 1, 2]);

        let wrapped = Topology::neighborhood(0, 10, 2, WrappingMode::Wrap, true);
        assert_eq!(wrapped, vec![0, 1, 2, 8, 9]);

        let last = Topology::neighborhood(9, 10, 1, WrappingMode::Wrap, false);
        assert_eq!(last, vec![0, 8]);
    }

    #[test]
    fn test_neighborhood_radius_covers_ring() {
        let all = Topology::neighborhood(3, 6, 10, WrappingMode::Wrap, true);
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);

        let without_center = Topology::neighborhood(3, 6, 10, WrappingMode::Wrap, false);
        assert_eq!(without_center.len(), 5);
        assert!(!without_center.contains(&3));
    }

    #[test]
    fn test_map_column_to_input() {
        assert_eq!(Topology::map_column_to_input(0, 10, 10), 0);
        assert_eq!(Topology::map_column_to_input(0, 5, 10), 1);
        assert_eq!(Topology::map_column_to_input(4, 5, 10), 9);
    }

    #[test]
    fn test_potential_pool() {
        let pool = Topology::map_potential_pool(0, 5, 10, 2, WrappingMode::NoWrap);
        assert_eq!(pool, vec![0, 1, 2, 3]);

        let global = Topology::map_potential_pool(2, 5, 10, 10, WrappingMode::Wrap);
        assert_eq!(global.len(), 10);
    }
}
