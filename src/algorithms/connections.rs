//! Connections - The synaptic connectivity graph for HTM.
//!
//! Cells own segments, segments own synapses, and every synapse points at a
//! presynaptic cell (or input bit). All three live in flat arenas addressed
//! by integer handles; destroyed slots are recycled. The Spatial Pooler uses
//! one segment per column whose presynaptic "cells" are input bits, the
//! Temporal Memory uses many segments per cell.

use crate::types::{
    CellIdx, Permanence, Segment, Synapse, MAX_PERMANENCE, MIN_PERMANENCE,
};
use crate::utils::Random;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

/// Data associated with a synapse.
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseData {
    /// The presynaptic cell this synapse connects to.
    pub presynaptic_cell: CellIdx,

    /// The permanence strength of this synapse.
    pub permanence: Permanence,

    /// The segment this synapse belongs to.
    pub segment: Segment,
}

/// Data associated with a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentData {
    /// The synapses on this segment.
    pub synapses: SmallVec<[Synapse; 32]>,

    /// The cell this segment belongs to.
    pub cell: CellIdx,

    /// Number of connected synapses (permanence >= threshold).
    pub num_connected: u32,

    /// Iteration at which this segment was created or last active.
    pub last_used: u64,
}

impl SegmentData {
    fn new(cell: CellIdx, last_used: u64) -> Self {
        Self {
            synapses: SmallVec::new(),
            cell,
            num_connected: 0,
            last_used,
        }
    }
}

/// Data associated with a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellData {
    /// The segments on this cell.
    pub segments: SmallVec<[Segment; 8]>,
}

/// Parameters for creating a Connections instance.
#[derive(Debug, Clone)]
pub struct ConnectionsParams {
    /// Number of cells that own segments.
    pub num_cells: CellIdx,

    /// Permanence threshold for a synapse to be considered connected.
    pub connected_threshold: Permanence,
}

impl Default for ConnectionsParams {
    fn default() -> Self {
        Self {
            num_cells: 0,
            connected_threshold: 0.5,
        }
    }
}

/// The synaptic connectivity shared by the Spatial Pooler and Temporal Memory.
#[derive(Debug, Clone)]
pub struct Connections {
    /// All cells in the connections graph.
    cells: Vec<CellData>,

    /// All segments (indexed by Segment).
    segments: Vec<SegmentData>,

    /// Destroyed segment slots ready for reuse.
    destroyed_segments: Vec<Segment>,

    /// Segments destroyed since the last activity computation. Their handles
    /// may still sit in activity lists computed earlier, so their slots are
    /// only recycled after the next `compute_activity`.
    pending_destroyed_segments: Vec<Segment>,

    /// All synapses (indexed by Synapse).
    synapses: Vec<SynapseData>,

    /// Destroyed synapse indices (available for reuse).
    destroyed_synapses: Vec<Synapse>,

    /// Permanence threshold for connected synapses.
    connected_threshold: Permanence,

    /// Iteration counter (incremented in compute_activity).
    iteration: u64,

    /// Maps presynaptic cell -> all synapses from that cell.
    potential_synapses_for_presynaptic_cell: AHashMap<CellIdx, Vec<Synapse>>,

    /// Maps presynaptic cell -> connected synapses from that cell.
    connected_synapses_for_presynaptic_cell: AHashMap<CellIdx, Vec<Synapse>>,
}

impl Connections {
    /// Creates a new Connections instance with the given parameters.
    pub fn new(params: ConnectionsParams) -> Self {
        Self {
            cells: vec![CellData::default(); params.num_cells as usize],
            segments: Vec::new(),
            destroyed_segments: Vec::new(),
            pending_destroyed_segments: Vec::new(),
            synapses: Vec::new(),
            destroyed_synapses: Vec::new(),
            connected_threshold: params.connected_threshold,
            iteration: 0,
            potential_synapses_for_presynaptic_cell: AHashMap::new(),
            connected_synapses_for_presynaptic_cell: AHashMap::new(),
        }
    }

    /// Creates a Connections instance with default parameters.
    pub fn with_cells(num_cells: CellIdx) -> Self {
        Self::new(ConnectionsParams {
            num_cells,
            ..Default::default()
        })
    }

    /// Returns the number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the connected threshold.
    #[inline]
    pub fn connected_threshold(&self) -> Permanence {
        self.connected_threshold
    }

    /// Returns the current iteration count.
    #[inline]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Returns the number of live segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len() - self.destroyed_segments.len() - self.pending_destroyed_segments.len()
    }

    /// Returns the number of segments on a specific cell.
    pub fn num_segments_on_cell(&self, cell: CellIdx) -> usize {
        self.cells[cell as usize].segments.len()
    }

    /// Returns the number of live synapses.
    pub fn num_synapses(&self) -> usize {
        self.synapses.len() - self.destroyed_synapses.len()
    }

    /// Returns the number of synapses on a specific segment.
    pub fn num_synapses_on_segment(&self, segment: Segment) -> usize {
        self.segments[segment as usize].synapses.len()
    }

    /// Returns the flat list length for segment indexing.
    pub fn segment_flat_list_length(&self) -> usize {
        self.segments.len()
    }

    // ========================================================================
    // Segment operations
    // ========================================================================

    /// Creates a new segment on the specified cell.
    ///
    /// When the cell already holds `max_segments_per_cell` segments, the
    /// least recently used ones are destroyed first.
    pub fn create_segment(&mut self, cell: CellIdx, max_segments_per_cell: Option<usize>) -> Segment {
        if let Some(max) = max_segments_per_cell {
            while !self.cells[cell as usize].segments.is_empty()
                && self.cells[cell as usize].segments.len() >= max
            {
                self.destroy_least_recently_used_segment(cell);
            }
        }

        let data = SegmentData::new(cell, self.iteration);
        let segment = if let Some(reuse) = self.destroyed_segments.pop() {
            self.segments[reuse as usize] = data;
            reuse
        } else {
            let segment = self.segments.len() as Segment;
            self.segments.push(data);
            segment
        };

        self.cells[cell as usize].segments.push(segment);
        segment
    }

    /// Destroys a segment and all its synapses.
    pub fn destroy_segment(&mut self, segment: Segment) {
        let cell = self.segments[segment as usize].cell;

        let synapses: Vec<Synapse> = self.segments[segment as usize].synapses.to_vec();
        for synapse in synapses {
            self.destroy_synapse(synapse);
        }

        let cell_segments = &mut self.cells[cell as usize].segments;
        if let Some(pos) = cell_segments.iter().position(|&s| s == segment) {
            cell_segments.remove(pos);
        }

        self.pending_destroyed_segments.push(segment);
    }

    fn destroy_least_recently_used_segment(&mut self, cell: CellIdx) {
        let oldest = self.cells[cell as usize]
            .segments
            .iter()
            .copied()
            .min_by_key(|&s| (self.segments[s as usize].last_used, s));

        if let Some(segment) = oldest {
            self.destroy_segment(segment);
        }
    }

    /// Marks a segment as used in the current iteration.
    #[inline]
    pub fn record_segment_activity(&mut self, segment: Segment) {
        self.segments[segment as usize].last_used = self.iteration;
    }

    /// Gets the segments for a cell, oldest first.
    #[inline]
    pub fn segments_for_cell(&self, cell: CellIdx) -> &[Segment] {
        &self.cells[cell as usize].segments
    }

    /// Gets the cell that owns a segment.
    #[inline]
    pub fn cell_for_segment(&self, segment: Segment) -> CellIdx {
        self.segments[segment as usize].cell
    }

    /// Gets the segment data.
    #[inline]
    pub fn data_for_segment(&self, segment: Segment) -> &SegmentData {
        &self.segments[segment as usize]
    }

    // ========================================================================
    // Synapse operations
    // ========================================================================

    /// Creates a new synapse on a segment.
    ///
    /// If a synapse to the same presynaptic cell already exists, returns the
    /// existing synapse, raising its permanence if the new one is higher.
    pub fn create_synapse(
        &mut self,
        segment: Segment,
        presynaptic_cell: CellIdx,
        permanence: Permanence,
    ) -> Synapse {
        let existing = self.segments[segment as usize]
            .synapses
            .iter()
            .find(|&&s| self.synapses[s as usize].presynaptic_cell == presynaptic_cell)
            .copied();

        if let Some(existing_synapse) = existing {
            if permanence > self.synapses[existing_synapse as usize].permanence {
                self.update_synapse_permanence(existing_synapse, permanence);
            }
            return existing_synapse;
        }

        let permanence = permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE);
        let data = SynapseData {
            presynaptic_cell,
            permanence,
            segment,
        };

        let synapse = if let Some(reuse) = self.destroyed_synapses.pop() {
            self.synapses[reuse as usize] = data;
            reuse
        } else {
            let synapse = self.synapses.len() as Synapse;
            self.synapses.push(data);
            synapse
        };

        self.segments[segment as usize].synapses.push(synapse);

        self.potential_synapses_for_presynaptic_cell
            .entry(presynaptic_cell)
            .or_default()
            .push(synapse);

        if permanence >= self.connected_threshold {
            self.segments[segment as usize].num_connected += 1;
            self.connected_synapses_for_presynaptic_cell
                .entry(presynaptic_cell)
                .or_default()
                .push(synapse);
        }

        synapse
    }

    /// Destroys a synapse.
    pub fn destroy_synapse(&mut self, synapse: Synapse) {
        let SynapseData {
            presynaptic_cell,
            permanence,
            segment,
        } = self.synapses[synapse as usize].clone();
        let was_connected = permanence >= self.connected_threshold;

        let segment_synapses = &mut self.segments[segment as usize].synapses;
        if let Some(pos) = segment_synapses.iter().position(|&s| s == synapse) {
            segment_synapses.remove(pos);
        }

        if was_connected {
            let data = &mut self.segments[segment as usize];
            data.num_connected = data.num_connected.saturating_sub(1);
            Self::remove_from_map(
                &mut self.connected_synapses_for_presynaptic_cell,
                presynaptic_cell,
                synapse,
            );
        }
        Self::remove_from_map(
            &mut self.potential_synapses_for_presynaptic_cell,
            presynaptic_cell,
            synapse,
        );

        // Invalid permanence marks the slot as free
        self.synapses[synapse as usize].permanence = -1.0;
        self.destroyed_synapses.push(synapse);
    }

    /// Updates a synapse's permanence value, clamped to `[0, 1]`.
    pub fn update_synapse_permanence(&mut self, synapse: Synapse, permanence: Permanence) {
        let permanence = permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE);
        let data = &mut self.synapses[synapse as usize];
        let was_connected = data.permanence >= self.connected_threshold;
        let is_connected = permanence >= self.connected_threshold;
        let presynaptic_cell = data.presynaptic_cell;
        let segment = data.segment;

        data.permanence = permanence;

        if was_connected == is_connected {
            return;
        }

        if is_connected {
            self.segments[segment as usize].num_connected += 1;
            self.connected_synapses_for_presynaptic_cell
                .entry(presynaptic_cell)
                .or_default()
                .push(synapse);
        } else {
            let data = &mut self.segments[segment as usize];
            data.num_connected = data.num_connected.saturating_sub(1);
            Self::remove_from_map(
                &mut self.connected_synapses_for_presynaptic_cell,
                presynaptic_cell,
                synapse,
            );
        }
    }

    fn remove_from_map(
        map: &mut AHashMap<CellIdx, Vec<Synapse>>,
        presynaptic_cell: CellIdx,
        synapse: Synapse,
    ) {
        if let Some(synapses) = map.get_mut(&presynaptic_cell) {
            if let Some(pos) = synapses.iter().position(|&s| s == synapse) {
                synapses.swap_remove(pos);
            }
        }
    }

    /// Gets the synapses on a segment.
    #[inline]
    pub fn synapses_for_segment(&self, segment: Segment) -> &[Synapse] {
        &self.segments[segment as usize].synapses
    }

    /// Gets the synapse data.
    #[inline]
    pub fn data_for_synapse(&self, synapse: Synapse) -> &SynapseData {
        &self.synapses[synapse as usize]
    }

    /// Gets the presynaptic cells for a segment.
    pub fn presynaptic_cells_for_segment(&self, segment: Segment) -> Vec<CellIdx> {
        self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| self.synapses[s as usize].presynaptic_cell)
            .collect()
    }

    // ========================================================================
    // Activity computation
    // ========================================================================

    /// Counts, per segment, the connected synapses from active presynaptic cells.
    ///
    /// Advances the iteration counter and releases segment slots destroyed
    /// since the previous call.
    pub fn compute_activity(&mut self, active_presynaptic_cells: &[CellIdx]) -> Vec<u32> {
        self.begin_iteration();

        let mut num_active_connected = vec![0u32; self.segments.len()];
        self.count_into(
            &self.connected_synapses_for_presynaptic_cell,
            active_presynaptic_cells,
            &mut num_active_connected,
        );
        num_active_connected
    }

    /// Computes both connected and potential (any permanence) activity.
    pub fn compute_activity_full(
        &mut self,
        active_presynaptic_cells: &[CellIdx],
    ) -> (Vec<u32>, Vec<u32>) {
        self.begin_iteration();

        let mut num_active_connected = vec![0u32; self.segments.len()];
        let mut num_active_potential = vec![0u32; self.segments.len()];
        self.count_into(
            &self.connected_synapses_for_presynaptic_cell,
            active_presynaptic_cells,
            &mut num_active_connected,
        );
        self.count_into(
            &self.potential_synapses_for_presynaptic_cell,
            active_presynaptic_cells,
            &mut num_active_potential,
        );
        (num_active_connected, num_active_potential)
    }

    fn begin_iteration(&mut self) {
        self.iteration += 1;
        self.destroyed_segments
            .append(&mut self.pending_destroyed_segments);
    }

    fn count_into(
        &self,
        map: &AHashMap<CellIdx, Vec<Synapse>>,
        active_presynaptic_cells: &[CellIdx],
        counts: &mut [u32],
    ) {
        for cell in active_presynaptic_cells {
            if let Some(synapses) = map.get(cell) {
                for &synapse in synapses {
                    counts[self.synapses[synapse as usize].segment as usize] += 1;
                }
            }
        }
    }

    // ========================================================================
    // Learning operations
    // ========================================================================

    /// Adapts a segment towards the active inputs.
    ///
    /// `active` is a dense mask over presynaptic cells. Synapses from active
    /// cells gain `increment`, the others lose `decrement`. With
    /// `prune_zero_synapses`, synapses left at zero permanence are destroyed
    /// and so is a segment left with no synapses.
    ///
    /// Returns false if the segment was destroyed.
    pub fn adapt_segment(
        &mut self,
        segment: Segment,
        active: &[bool],
        increment: Permanence,
        decrement: Permanence,
        prune_zero_synapses: bool,
    ) -> bool {
        let synapses: SmallVec<[Synapse; 32]> = self.segments[segment as usize].synapses.clone();
        let mut synapses_to_destroy = Vec::new();

        for synapse in synapses {
            let data = &self.synapses[synapse as usize];
            let is_active = active
                .get(data.presynaptic_cell as usize)
                .copied()
                .unwrap_or(false);
            let delta = if is_active { increment } else { -decrement };

            let old_perm = data.permanence;
            let new_perm = (old_perm + delta).clamp(MIN_PERMANENCE, MAX_PERMANENCE);
            if new_perm != old_perm {
                self.update_synapse_permanence(synapse, new_perm);
            }

            if prune_zero_synapses && new_perm < crate::types::EPSILON {
                synapses_to_destroy.push(synapse);
            }
        }

        for synapse in synapses_to_destroy {
            self.destroy_synapse(synapse);
        }

        if prune_zero_synapses && self.segments[segment as usize].synapses.is_empty() {
            self.destroy_segment(segment);
            return false;
        }
        true
    }

    /// Grows new synapses on a segment to a random subset of candidates.
    ///
    /// Candidates already connected to the segment are skipped. When
    /// `max_synapses_per_segment` would be exceeded, the weakest existing
    /// synapses are destroyed first; if that is not enough, fewer synapses
    /// are grown.
    pub fn grow_synapses(
        &mut self,
        segment: Segment,
        growth_candidates: &[CellIdx],
        initial_permanence: Permanence,
        rng: &mut Random,
        max_new: usize,
        max_synapses_per_segment: Option<usize>,
    ) {
        let existing: AHashSet<CellIdx> = self
            .presynaptic_cells_for_segment(segment)
            .into_iter()
            .collect();

        let candidates: Vec<CellIdx> = growth_candidates
            .iter()
            .copied()
            .filter(|c| !existing.contains(c))
            .collect();

        if candidates.is_empty() || max_new == 0 {
            return;
        }

        let mut candidates = rng.sample(candidates, max_new);

        if let Some(max) = max_synapses_per_segment {
            let current = self.segments[segment as usize].synapses.len();
            if current + candidates.len() > max {
                let overrun = current + candidates.len() - max;
                self.destroy_min_permanence_synapses(segment, overrun, growth_candidates);
            }
            let room = max.saturating_sub(self.segments[segment as usize].synapses.len());
            candidates.truncate(room);
        }

        for candidate in candidates {
            self.create_synapse(segment, candidate, initial_permanence);
        }
    }

    /// Raises permanences until the segment has at least `threshold` connected synapses.
    pub fn raise_permanences_to_threshold(&mut self, segment: Segment, threshold: u32) {
        let current_connected = self.segments[segment as usize].num_connected;
        if current_connected >= threshold {
            return;
        }
        let needed = (threshold - current_connected) as usize;

        let mut unconnected: Vec<(Synapse, Permanence)> = self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| (s, self.synapses[s as usize].permanence))
            .filter(|&(_, perm)| perm < self.connected_threshold)
            .collect();

        // Strongest first, lowest handle on ties
        unconnected.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        for (synapse, _) in unconnected.into_iter().take(needed) {
            self.update_synapse_permanence(synapse, self.connected_threshold);
        }
    }

    /// Uniformly adjusts all permanences on a segment.
    pub fn bump_segment(&mut self, segment: Segment, delta: Permanence) {
        let synapses: SmallVec<[Synapse; 32]> = self.segments[segment as usize].synapses.clone();
        for synapse in synapses {
            let old_perm = self.synapses[synapse as usize].permanence;
            self.update_synapse_permanence(synapse, old_perm + delta);
        }
    }

    /// Destroys the `n_destroy` weakest synapses whose presynaptic cell is
    /// not in `exclude_cells`.
    pub fn destroy_min_permanence_synapses(
        &mut self,
        segment: Segment,
        n_destroy: usize,
        exclude_cells: &[CellIdx],
    ) {
        if n_destroy == 0 {
            return;
        }

        let exclude: AHashSet<CellIdx> = exclude_cells.iter().copied().collect();

        let mut candidates: Vec<(Synapse, Permanence)> = self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| (s, &self.synapses[s as usize]))
            .filter(|(_, data)| !exclude.contains(&data.presynaptic_cell))
            .map(|(s, data)| (s, data.permanence))
            .collect();

        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        for (synapse, _) in candidates.into_iter().take(n_destroy) {
            self.destroy_synapse(synapse);
        }
    }
}
