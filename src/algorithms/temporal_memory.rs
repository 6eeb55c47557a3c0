//! Temporal Memory implementation.
//!
//! The Temporal Memory algorithm learns temporal sequences by forming
//! connections between cells. It predicts future states based on
//! learned patterns.
//!
//! One step runs in three phases:
//!
//! 1. The raw anomaly score is taken from the predictions made last step.
//! 2. Active columns are expanded into active and winner cells, bursting
//!    columns that held no predicted cell. Segments are reinforced, grown
//!    or punished while the previous activity is still at hand.
//! 3. Segment activity for the new active cells yields the active and
//!    matching segments that form the next prediction.

use crate::algorithms::{Anomaly, Connections, ConnectionsParams};
use crate::error::{HtmError, Result};
use crate::types::{CellIdx, Permanence, Score, Sdr, Segment, UInt};
use crate::utils::Random;

use ahash::AHashMap;
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for creating a Temporal Memory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalMemoryParams {
    /// Number of columns.
    pub num_columns: UInt,

    /// Number of cells per column.
    pub cells_per_column: UInt,

    /// Connected synapses to active cells needed for a segment to become active.
    pub activation_threshold: UInt,

    /// Initial permanence for new synapses.
    pub initial_permanence: Permanence,

    /// Permanence threshold for connected synapses.
    pub connected_permanence: Permanence,

    /// Potential synapses to active cells needed for a segment to match.
    pub min_threshold: UInt,

    /// Maximum number of synapses per segment.
    pub max_synapses_per_segment: UInt,

    /// Maximum number of segments per cell.
    pub max_segments_per_cell: UInt,

    /// Maximum number of new synapses added per learning cycle.
    pub max_new_synapse_count: UInt,

    /// Amount to increment permanence for active synapses.
    pub permanence_increment: Permanence,

    /// Amount to decrement permanence for inactive synapses.
    pub permanence_decrement: Permanence,

    /// Amount to decrement permanence for predicted-inactive segments.
    pub predicted_segment_decrement: Permanence,

    /// Random seed.
    pub seed: u64,
}

impl Default for TemporalMemoryParams {
    fn default() -> Self {
        Self {
            num_columns: 2048,
            cells_per_column: 32,
            activation_threshold: 13,
            initial_permanence: 0.21,
            connected_permanence: 0.5,
            min_threshold: 10,
            max_synapses_per_segment: 255,
            max_segments_per_cell: 255,
            max_new_synapse_count: 20,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            predicted_segment_decrement: 0.0,
            seed: 42,
        }
    }
}

impl TemporalMemoryParams {
    /// Checks every parameter against its valid range and against each other.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("num_columns", self.num_columns),
            ("cells_per_column", self.cells_per_column),
            ("activation_threshold", self.activation_threshold),
            ("min_threshold", self.min_threshold),
            ("max_synapses_per_segment", self.max_synapses_per_segment),
            ("max_segments_per_cell", self.max_segments_per_cell),
        ] {
            if value == 0 {
                return Err(HtmError::InvalidParameter {
                    name,
                    message: "Must be > 0".to_string(),
                });
            }
        }
        for (name, value) in [
            ("initial_permanence", self.initial_permanence),
            ("connected_permanence", self.connected_permanence),
            ("permanence_increment", self.permanence_increment),
            ("permanence_decrement", self.permanence_decrement),
            ("predicted_segment_decrement", self.predicted_segment_decrement),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HtmError::InvalidParameter {
                    name,
                    message: format!("Must be in range [0, 1], got {value}"),
                });
            }
        }
        if self.max_new_synapse_count > self.max_synapses_per_segment {
            return Err(HtmError::IncompatibleParameters(format!(
                "max_new_synapse_count ({}) exceeds max_synapses_per_segment ({})",
                self.max_new_synapse_count, self.max_synapses_per_segment
            )));
        }
        if self.activation_threshold > self.max_synapses_per_segment {
            return Err(HtmError::IncompatibleParameters(format!(
                "activation_threshold ({}) exceeds max_synapses_per_segment ({}), no segment could ever activate",
                self.activation_threshold, self.max_synapses_per_segment
            )));
        }
        if self.min_threshold > self.max_new_synapse_count {
            return Err(HtmError::IncompatibleParameters(format!(
                "min_threshold ({}) exceeds max_new_synapse_count ({}), no segment could ever match",
                self.min_threshold, self.max_new_synapse_count
            )));
        }
        Ok(())
    }
}

/// The Temporal Memory algorithm.
///
/// Temporal Memory learns sequences by forming connections between
/// cells in different columns. It maintains a prediction of which
/// cells will become active in the next time step.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::algorithms::{TemporalMemory, TemporalMemoryParams};
/// use htm_anomaly::types::Sdr;
///
/// let mut tm = TemporalMemory::new(TemporalMemoryParams {
///     num_columns: 100,
///     cells_per_column: 4,
///     ..Default::default()
/// }).unwrap();
///
/// let active_columns = Sdr::from_sparse(100, vec![1, 5, 10, 20]).unwrap();
/// let anomaly = tm.compute(&active_columns, true).unwrap();
///
/// // Nothing was predicted yet: every column bursts
/// assert_eq!(anomaly, 1.0);
/// assert_eq!(tm.active_cells().len(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct TemporalMemory {
    // Configuration
    num_columns: usize,
    cells_per_column: UInt,
    num_cells: usize,
    activation_threshold: UInt,
    initial_permanence: Permanence,
    min_threshold: UInt,
    max_synapses_per_segment: UInt,
    max_segments_per_cell: UInt,
    max_new_synapse_count: UInt,
    permanence_increment: Permanence,
    permanence_decrement: Permanence,
    predicted_segment_decrement: Permanence,

    // Connections
    connections: Connections,

    // State
    active_cells: Vec<CellIdx>,
    winner_cells: Vec<CellIdx>,
    active_segments: Vec<Segment>,
    matching_segments: Vec<Segment>,
    num_active_potential_synapses_for_segment: Vec<u32>,

    anomaly: Score,

    rng: Random,

    iteration: u64,
}

type ColumnSegments = AHashMap<usize, SmallVec<[Segment; 4]>>;

impl TemporalMemory {
    /// Creates a new Temporal Memory with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any parameter is out of range or two
    /// parameters contradict each other.
    pub fn new(params: TemporalMemoryParams) -> Result<Self> {
        params.validate()?;

        let num_columns = params.num_columns as usize;
        let num_cells = num_columns * params.cells_per_column as usize;

        Ok(Self {
            num_columns,
            cells_per_column: params.cells_per_column,
            num_cells,
            activation_threshold: params.activation_threshold,
            initial_permanence: params.initial_permanence,
            min_threshold: params.min_threshold,
            max_synapses_per_segment: params.max_synapses_per_segment,
            max_segments_per_cell: params.max_segments_per_cell,
            max_new_synapse_count: params.max_new_synapse_count,
            permanence_increment: params.permanence_increment,
            permanence_decrement: params.permanence_decrement,
            predicted_segment_decrement: params.predicted_segment_decrement,

            connections: Connections::new(ConnectionsParams {
                num_cells: num_cells as CellIdx,
                connected_threshold: params.connected_permanence,
            }),

            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            active_segments: Vec::new(),
            matching_segments: Vec::new(),
            num_active_potential_synapses_for_segment: Vec::new(),

            anomaly: 0.0,
            rng: Random::new(params.seed),
            iteration: 0,
        })
    }

    /// Main compute method.
    ///
    /// Given the active columns from the Spatial Pooler, computes the
    /// active and predictive cells and returns the raw anomaly score: the
    /// fraction of active columns that were not predicted.
    ///
    /// # Errors
    ///
    /// Returns [`HtmError::InvalidInput`] if the SDR width is not the column count.
    pub fn compute(&mut self, active_columns: &Sdr, learn: bool) -> Result<Score> {
        if active_columns.size() != self.num_columns {
            return Err(HtmError::InvalidInput(format!(
                "temporal memory expects {} columns, got {}",
                self.num_columns,
                active_columns.size()
            )));
        }

        self.iteration += 1;

        self.anomaly = Anomaly::compute(active_columns, &self.predicted_columns());

        self.activate_cells(active_columns, learn);
        self.activate_dendrites(learn);

        Ok(self.anomaly)
    }

    /// Columns holding at least one predictive cell.
    fn predicted_columns(&self) -> Sdr {
        let mut columns: Vec<u32> = self
            .active_segments
            .iter()
            .map(|&s| self.column_for_cell(self.connections.cell_for_segment(s)) as u32)
            .collect();
        columns.dedup();
        Sdr::from_sparse_unchecked(self.num_columns, columns)
    }

    fn group_by_column(&self, segments: &[Segment]) -> ColumnSegments {
        let mut grouped = ColumnSegments::default();
        for &segment in segments {
            let column = self.column_for_cell(self.connections.cell_for_segment(segment));
            grouped.entry(column).or_default().push(segment);
        }
        grouped
    }

    /// Computes active and winner cells, learning on the way.
    fn activate_cells(&mut self, active_columns: &Sdr, learn: bool) {
        let prev_active_cells = std::mem::take(&mut self.active_cells);
        let prev_winner_cells = std::mem::take(&mut self.winner_cells);

        let mut prev_active_mask = vec![false; self.num_cells];
        for &cell in &prev_active_cells {
            prev_active_mask[cell as usize] = true;
        }

        let active_by_column = self.group_by_column(&self.active_segments);
        let matching_by_column = self.group_by_column(&self.matching_segments);

        for &column in active_columns.get_sparse() {
            let column = column as usize;

            if let Some(segments) = active_by_column.get(&column) {
                self.activate_predicted_column(segments, &prev_active_mask, &prev_winner_cells, learn);
            } else {
                self.burst_column(
                    column,
                    matching_by_column.get(&column).map(|s| s.as_slice()),
                    &prev_active_mask,
                    &prev_winner_cells,
                    learn,
                );
            }
        }

        // Punish matching segments in columns that did not become active
        if learn && self.predicted_segment_decrement > 0.0 {
            let wrong: Vec<Segment> = self
                .matching_segments
                .iter()
                .copied()
                .filter(|&s| {
                    let column = self.column_for_cell(self.connections.cell_for_segment(s));
                    !active_columns.contains(column as u32)
                })
                .collect();

            for segment in wrong {
                self.connections.adapt_segment(
                    segment,
                    &prev_active_mask,
                    -self.predicted_segment_decrement,
                    0.0,
                    true,
                );
            }
        }
    }

    /// Activates the cells of a column that was correctly predicted.
    fn activate_predicted_column(
        &mut self,
        segments: &[Segment],
        prev_active_mask: &[bool],
        prev_winner_cells: &[CellIdx],
        learn: bool,
    ) {
        for &segment in segments {
            let cell = self.connections.cell_for_segment(segment);
            // Segments arrive grouped by cell
            if self.active_cells.last() != Some(&cell) {
                self.active_cells.push(cell);
                self.winner_cells.push(cell);
            }

            if learn {
                self.learn_on_segment(segment, prev_active_mask, prev_winner_cells);
            }
        }
    }

    /// Bursts a column (activates all cells when unpredicted).
    fn burst_column(
        &mut self,
        column: usize,
        matching_segments: Option<&[Segment]>,
        prev_active_mask: &[bool],
        prev_winner_cells: &[CellIdx],
        learn: bool,
    ) {
        let first_cell = self.column_cell(column, 0);
        self.active_cells
            .extend(first_cell..first_cell + self.cells_per_column);

        let best_matching = matching_segments.and_then(|segments| {
            segments.iter().copied().min_by_key(|&s| {
                let potential = self.num_active_potential_synapses_for_segment[s as usize];
                (std::cmp::Reverse(potential), s)
            })
        });

        let winner_cell = if let Some(segment) = best_matching {
            let cell = self.connections.cell_for_segment(segment);
            if learn {
                self.learn_on_segment(segment, prev_active_mask, prev_winner_cells);
            }
            cell
        } else {
            let cell = self.least_used_cell(column);

            if learn && !prev_winner_cells.is_empty() {
                let count = (self.max_new_synapse_count as usize).min(prev_winner_cells.len());
                let segment = self
                    .connections
                    .create_segment(cell, Some(self.max_segments_per_cell as usize));
                self.connections.grow_synapses(
                    segment,
                    prev_winner_cells,
                    self.initial_permanence,
                    &mut self.rng,
                    count,
                    Some(self.max_synapses_per_segment as usize),
                );
            }

            cell
        };

        self.winner_cells.push(winner_cell);
    }

    /// Reinforces a segment and tops it up to `max_new_synapse_count`
    /// synapses onto previous winner cells.
    fn learn_on_segment(
        &mut self,
        segment: Segment,
        prev_active_mask: &[bool],
        prev_winner_cells: &[CellIdx],
    ) {
        let alive = self.connections.adapt_segment(
            segment,
            prev_active_mask,
            self.permanence_increment,
            self.permanence_decrement,
            true,
        );
        if !alive {
            return;
        }

        let num_active = self.num_active_potential_synapses_for_segment[segment as usize] as usize;
        let new_synapse_count = (self.max_new_synapse_count as usize).saturating_sub(num_active);

        if new_synapse_count > 0 {
            self.connections.grow_synapses(
                segment,
                prev_winner_cells,
                self.initial_permanence,
                &mut self.rng,
                new_synapse_count,
                Some(self.max_synapses_per_segment as usize),
            );
        }
    }

    /// Returns a cell with the fewest segments in a column, ties broken at random.
    fn least_used_cell(&mut self, column: usize) -> CellIdx {
        let first_cell = self.column_cell(column, 0);
        let cells = first_cell..first_cell + self.cells_per_column;

        let fewest = cells
            .clone()
            .map(|c| self.connections.num_segments_on_cell(c))
            .min()
            .unwrap_or(0);

        let candidates: SmallVec<[CellIdx; 32]> = cells
            .filter(|&c| self.connections.num_segments_on_cell(c) == fewest)
            .collect();

        candidates[self.rng.get_usize(candidates.len())]
    }

    /// Computes segment activity for the current active cells.
    fn activate_dendrites(&mut self, learn: bool) {
        let (num_active_connected, num_active_potential) =
            self.connections.compute_activity_full(&self.active_cells);

        self.active_segments.clear();
        self.matching_segments.clear();

        for (segment, (&connected, &potential)) in num_active_connected
            .iter()
            .zip(&num_active_potential)
            .enumerate()
        {
            if connected >= self.activation_threshold {
                self.active_segments.push(segment as Segment);
            }
            if potential >= self.min_threshold {
                self.matching_segments.push(segment as Segment);
            }
        }

        let connections = &self.connections;
        let by_cell = |s: &Segment| (connections.cell_for_segment(*s), *s);
        self.active_segments.sort_unstable_by_key(by_cell);
        self.matching_segments.sort_unstable_by_key(by_cell);

        self.num_active_potential_synapses_for_segment = num_active_potential;

        if learn {
            for i in 0..self.active_segments.len() {
                self.connections
                    .record_segment_activity(self.active_segments[i]);
            }
        }
    }

    // ========================================================================
    // Cell/Column utilities
    // ========================================================================

    /// Returns the cell index for a column and cell offset.
    #[inline]
    fn column_cell(&self, column: usize, cell_offset: usize) -> CellIdx {
        (column * self.cells_per_column as usize + cell_offset) as CellIdx
    }

    /// Returns the column for a cell index.
    #[inline]
    pub fn column_for_cell(&self, cell: CellIdx) -> usize {
        cell as usize / self.cells_per_column as usize
    }

    /// Clears the sequence state so the next input is not treated as a
    /// continuation of the previous one. Learned connections are kept.
    pub fn reset(&mut self) {
        self.active_cells.clear();
        self.winner_cells.clear();
        self.active_segments.clear();
        self.matching_segments.clear();
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Returns the number of columns.
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Returns the number of cells per column.
    pub fn cells_per_column(&self) -> UInt {
        self.cells_per_column
    }

    /// Returns the total number of cells.
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Returns the currently active cells.
    pub fn active_cells(&self) -> &[CellIdx] {
        &self.active_cells
    }

    /// Returns the winner cells from the last compute.
    pub fn winner_cells(&self) -> &[CellIdx] {
        &self.winner_cells
    }

    /// Returns the cells predicted for the next step, ascending.
    pub fn predictive_cells(&self) -> Vec<CellIdx> {
        let mut cells: Vec<CellIdx> = self
            .active_segments
            .iter()
            .map(|&s| self.connections.cell_for_segment(s))
            .collect();
        cells.dedup();
        cells
    }

    /// Returns the active segments, grouped by cell.
    pub fn active_segments(&self) -> &[Segment] {
        &self.active_segments
    }

    /// Returns the matching segments, grouped by cell.
    pub fn matching_segments(&self) -> &[Segment] {
        &self.matching_segments
    }

    /// Returns the raw anomaly score of the last compute.
    pub fn anomaly(&self) -> Score {
        self.anomaly
    }

    /// Returns a reference to the connections.
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// Returns the segment cap per cell.
    pub fn max_segments_per_cell(&self) -> UInt {
        self.max_segments_per_cell
    }

    /// Returns the synapse cap per segment.
    pub fn max_synapses_per_segment(&self) -> UInt {
        self.max_synapses_per_segment
    }

    /// Returns the current iteration.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(bits: std::ops::Range<u32>) -> Sdr {
        Sdr::from_sparse(50, bits.collect()).unwrap()
    }

    fn sequence_tm(predicted_segment_decrement: Permanence) -> TemporalMemory {
        TemporalMemory::new(TemporalMemoryParams {
            num_columns: 50,
            cells_per_column: 4,
            activation_threshold: 3,
            min_threshold: 2,
            max_new_synapse_count: 5,
            initial_permanence: 0.5,
            connected_permanence: 0.5,
            predicted_segment_decrement,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_create_temporal_memory() {
        let tm = TemporalMemory::new(TemporalMemoryParams {
            num_columns: 100,
            cells_per_column: 4,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(tm.num_columns(), 100);
        assert_eq!(tm.cells_per_column(), 4);
        assert_eq!(tm.num_cells(), 400);
    }

    #[test]
    fn test_first_step_bursts() {
        let mut tm = sequence_tm(0.0);

        let anomaly = tm.compute(&columns(0..5), true).unwrap();

        assert_eq!(anomaly, 1.0);
        assert_eq!(tm.active_cells().len(), 20);
        assert_eq!(tm.winner_cells().len(), 5);
        // No previous winners, so nothing to grow
        assert_eq!(tm.connections().num_segments(), 0);
    }

    #[test]
    fn test_empty_active_columns() {
        let mut tm = sequence_tm(0.0);
        let anomaly = tm.compute(&Sdr::new(50), true).unwrap();
        assert_eq!(anomaly, 0.0);
        assert!(tm.active_cells().is_empty());
    }

    #[test]
    fn test_wrong_width_rejected() {
        let mut tm = sequence_tm(0.0);
        assert!(tm.compute(&Sdr::new(49), true).is_err());
        assert_eq!(tm.iteration(), 0);
    }

    #[test]
    fn test_learns_sequence() {
        let mut tm = sequence_tm(0.0);
        let a = columns(0..5);
        let b = columns(10..15);

        for _ in 0..2 {
            tm.reset();
            tm.compute(&a, true).unwrap();
            tm.compute(&b, true).unwrap();
        }

        tm.reset();
        tm.compute(&a, true).unwrap();
        let predicted: Vec<usize> = tm
            .predictive_cells()
            .iter()
            .map(|&c| tm.column_for_cell(c))
            .collect();
        assert_eq!(predicted, vec![10, 11, 12, 13, 14]);

        let anomaly = tm.compute(&b, true).unwrap();
        assert_eq!(anomaly, 0.0);
        // A correctly predicted column activates only its predicted cell
        assert_eq!(tm.active_cells().len(), 5);
    }

    #[test]
    fn test_partial_prediction() {
        let mut tm = sequence_tm(0.0);
        let a = columns(0..5);

        for _ in 0..2 {
            tm.reset();
            tm.compute(&a, true).unwrap();
            tm.compute(&columns(10..15), true).unwrap();
        }

        tm.reset();
        tm.compute(&a, true).unwrap();
        // Two of the four active columns were predicted
        let anomaly = tm.compute(&columns(13..17), true).unwrap();
        assert!((anomaly - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_punishes_wrong_predictions() {
        let mut tm = sequence_tm(0.05);
        let a = columns(0..5);

        for _ in 0..2 {
            tm.reset();
            tm.compute(&a, true).unwrap();
            tm.compute(&columns(10..15), true).unwrap();
        }

        let total_permanence = |tm: &TemporalMemory, segments: &[Segment]| -> f32 {
            let conn = tm.connections();
            segments
                .iter()
                .flat_map(|&s| conn.synapses_for_segment(s).to_vec())
                .map(|syn| conn.data_for_synapse(syn).permanence)
                .sum()
        };

        tm.reset();
        tm.compute(&a, true).unwrap();
        let predicting = tm.matching_segments().to_vec();
        assert_eq!(predicting.len(), 5);
        let before = total_permanence(&tm, &predicting);

        tm.compute(&columns(30..35), true).unwrap();
        let after = total_permanence(&tm, &predicting);
        assert!((before - after - 25.0 * 0.05).abs() < 1e-4);
    }

    #[test]
    fn test_segment_cap_respected() {
        let mut tm = TemporalMemory::new(TemporalMemoryParams {
            num_columns: 20,
            cells_per_column: 1,
            activation_threshold: 2,
            min_threshold: 1,
            max_new_synapse_count: 3,
            max_synapses_per_segment: 3,
            max_segments_per_cell: 2,
            ..Default::default()
        })
        .unwrap();

        let mut rng = Random::new(7);
        for _ in 0..300 {
            let mut bits: Vec<u32> = rng
                .sample_indices(20, 3)
                .into_iter()
                .map(|i| i as u32)
                .collect();
            bits.sort_unstable();
            tm.compute(&Sdr::from_sparse(20, bits).unwrap(), true).unwrap();

            let conn = tm.connections();
            for cell in 0..20 {
                assert!(conn.num_segments_on_cell(cell) <= 2);
                for &segment in conn.segments_for_cell(cell) {
                    assert!(conn.num_synapses_on_segment(segment) <= 3);
                }
            }
        }
    }

    #[test]
    fn test_incompatible_params() {
        let result = TemporalMemory::new(TemporalMemoryParams {
            min_threshold: 30,
            max_new_synapse_count: 20,
            ..Default::default()
        });
        assert!(matches!(result, Err(HtmError::IncompatibleParameters(_))));

        let result = TemporalMemory::new(TemporalMemoryParams {
            cells_per_column: 0,
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_cell_column_mapping() {
        let tm = TemporalMemory::new(TemporalMemoryParams {
            num_columns: 10,
            cells_per_column: 4,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(tm.column_for_cell(0), 0);
        assert_eq!(tm.column_for_cell(3), 0);
        assert_eq!(tm.column_for_cell(4), 1);
        assert_eq!(tm.column_for_cell(7), 1);

        assert_eq!(tm.column_cell(0, 3), 3);
        assert_eq!(tm.column_cell(1, 0), 4);
    }
}
