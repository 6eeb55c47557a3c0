//! Spatial Pooler implementation.
//!
//! The Spatial Pooler is responsible for creating sparse distributed representations
//! of the input. Given an input SDR, it computes a set of active columns and
//! simultaneously updates its permanences, duty cycles, etc.
//!
//! Each column owns exactly one segment in the underlying [`Connections`],
//! created in column order, so a column index doubles as its segment handle.
//! The synapses of that segment form the column's potential pool; pool
//! membership is fixed at construction and only permanences change.

use crate::algorithms::{Connections, ConnectionsParams};
use crate::error::{HtmError, Result};
use crate::types::{
    CellIdx, Permanence, Real, Sdr, Segment, UInt, MAX_PERMANENCE, MIN_PERMANENCE,
};
use crate::utils::{Random, Topology, WrappingMode};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for creating a Spatial Pooler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpatialPoolerParams {
    /// Width of the input space.
    pub num_inputs: UInt,

    /// Number of columns.
    pub num_columns: UInt,

    /// The extent of input that each column can potentially connect to.
    /// `None` covers the whole input (all-to-all potential connectivity).
    pub potential_radius: Option<UInt>,

    /// Fraction of inputs within potential radius that a column connects to (0.0-1.0).
    pub potential_pct: Real,

    /// If true, all columns compete globally. If false, local inhibition is used.
    pub global_inhibition: bool,

    /// Target density of active columns (fraction of columns that should be active).
    pub local_area_density: Real,

    /// Minimum raw overlap for a column to be considered for activation.
    pub stimulus_threshold: UInt,

    /// Amount to decrease permanence of inactive synapses during learning.
    pub syn_perm_inactive_dec: Permanence,

    /// Amount to increase permanence of active synapses during learning.
    pub syn_perm_active_inc: Permanence,

    /// Permanence threshold for a synapse to be considered connected.
    pub syn_perm_connected: Permanence,

    /// Minimum fraction of max overlap duty cycle for a column to avoid boosting.
    pub min_pct_overlap_duty_cycles: Real,

    /// Period (in iterations) for duty cycle computations.
    pub duty_cycle_period: UInt,

    /// Strength of boosting (0.0 = no boosting).
    pub boost_strength: Real,

    /// Random seed.
    pub seed: u64,

    /// Whether the column and input spaces are rings.
    pub wrap_around: bool,
}

impl Default for SpatialPoolerParams {
    fn default() -> Self {
        Self {
            num_inputs: 100,
            num_columns: 2048,
            potential_radius: None,
            potential_pct: 0.5,
            global_inhibition: true,
            local_area_density: 0.02,
            stimulus_threshold: 0,
            syn_perm_inactive_dec: 0.008,
            syn_perm_active_inc: 0.05,
            syn_perm_connected: 0.1,
            min_pct_overlap_duty_cycles: 0.001,
            duty_cycle_period: 1000,
            boost_strength: 0.0,
            seed: 1,
            wrap_around: true,
        }
    }
}

impl SpatialPoolerParams {
    /// Checks every parameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.num_inputs == 0 {
            return Err(HtmError::InvalidParameter {
                name: "num_inputs",
                message: "Must be > 0".to_string(),
            });
        }
        if self.num_columns == 0 {
            return Err(HtmError::InvalidParameter {
                name: "num_columns",
                message: "Must be > 0".to_string(),
            });
        }
        if !(self.potential_pct > 0.0 && self.potential_pct <= 1.0) {
            return Err(HtmError::InvalidParameter {
                name: "potential_pct",
                message: "Must be in range (0, 1]".to_string(),
            });
        }
        if !(self.local_area_density > 0.0 && self.local_area_density <= 0.5) {
            return Err(HtmError::InvalidParameter {
                name: "local_area_density",
                message: "Must be in range (0, 0.5]".to_string(),
            });
        }
        for (name, value) in [
            ("syn_perm_inactive_dec", self.syn_perm_inactive_dec),
            ("syn_perm_active_inc", self.syn_perm_active_inc),
            ("syn_perm_connected", self.syn_perm_connected),
            ("min_pct_overlap_duty_cycles", self.min_pct_overlap_duty_cycles),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HtmError::InvalidParameter {
                    name,
                    message: format!("Must be in range [0, 1], got {value}"),
                });
            }
        }
        if self.duty_cycle_period == 0 {
            return Err(HtmError::InvalidParameter {
                name: "duty_cycle_period",
                message: "Must be > 0".to_string(),
            });
        }
        if !(self.boost_strength >= 0.0 && self.boost_strength.is_finite()) {
            return Err(HtmError::InvalidParameter {
                name: "boost_strength",
                message: "Must be a finite value >= 0".to_string(),
            });
        }
        Ok(())
    }
}

/// The Spatial Pooler algorithm.
///
/// The Spatial Pooler creates sparse distributed representations of input patterns.
/// It learns stable representations by adjusting synaptic permanences and using
/// competitive inhibition.
///
/// # Example
///
/// ```rust
/// use htm_anomaly::algorithms::{SpatialPooler, SpatialPoolerParams};
/// use htm_anomaly::types::Sdr;
///
/// let mut sp = SpatialPooler::new(SpatialPoolerParams {
///     num_inputs: 100,
///     num_columns: 200,
///     local_area_density: 0.05,
///     ..Default::default()
/// }).unwrap();
///
/// let input = Sdr::from_sparse(100, vec![1, 5, 10, 20, 30]).unwrap();
/// let active = sp.compute(&input, true).unwrap();
/// assert_eq!(active.get_sum(), 10);
/// ```
#[derive(Debug, Clone)]
pub struct SpatialPooler {
    // Configuration
    num_inputs: usize,
    num_columns: usize,
    potential_radius: UInt,
    potential_pct: Real,
    global_inhibition: bool,
    local_area_density: Real,
    stimulus_threshold: UInt,
    inhibition_radius: UInt,
    duty_cycle_period: UInt,
    boost_strength: Real,
    wrap_around: WrappingMode,
    update_period: UInt,

    // Permanence parameters
    syn_perm_inactive_dec: Permanence,
    syn_perm_active_inc: Permanence,
    syn_perm_below_stimulus_inc: Permanence,
    syn_perm_connected: Permanence,
    min_pct_overlap_duty_cycles: Real,
    init_connected_pct: Real,

    // State
    boost_factors: Vec<Real>,
    overlap_duty_cycles: Vec<Real>,
    active_duty_cycles: Vec<Real>,
    min_overlap_duty_cycles: Vec<Real>,
    overlaps: Vec<u32>,
    boosted_overlaps: Vec<Real>,

    // Synaptic connections (one segment per column)
    connections: Connections,

    iteration_num: UInt,
    iteration_learn_num: UInt,

    rng: Random,
}

impl SpatialPooler {
    /// Creates a new Spatial Pooler with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any parameter is out of range.
    pub fn new(params: SpatialPoolerParams) -> Result<Self> {
        params.validate()?;

        let num_inputs = params.num_inputs as usize;
        let num_columns = params.num_columns as usize;

        let mut sp = Self {
            num_inputs,
            num_columns,
            potential_radius: params.potential_radius.unwrap_or(params.num_inputs),
            potential_pct: params.potential_pct,
            global_inhibition: params.global_inhibition,
            local_area_density: params.local_area_density,
            stimulus_threshold: params.stimulus_threshold,
            inhibition_radius: 0,
            duty_cycle_period: params.duty_cycle_period,
            boost_strength: params.boost_strength,
            wrap_around: params.wrap_around.into(),
            update_period: 50,

            syn_perm_inactive_dec: params.syn_perm_inactive_dec,
            syn_perm_active_inc: params.syn_perm_active_inc,
            syn_perm_below_stimulus_inc: params.syn_perm_connected / 10.0,
            syn_perm_connected: params.syn_perm_connected,
            min_pct_overlap_duty_cycles: params.min_pct_overlap_duty_cycles,
            init_connected_pct: 0.5,

            boost_factors: vec![1.0; num_columns],
            overlap_duty_cycles: vec![0.0; num_columns],
            active_duty_cycles: vec![0.0; num_columns],
            min_overlap_duty_cycles: vec![0.0; num_columns],
            overlaps: vec![0; num_columns],
            boosted_overlaps: vec![0.0; num_columns],

            connections: Connections::new(ConnectionsParams {
                num_cells: num_columns as CellIdx,
                connected_threshold: params.syn_perm_connected,
            }),

            iteration_num: 0,
            iteration_learn_num: 0,

            rng: Random::new(params.seed),
        };

        sp.initialize_columns();
        sp.update_inhibition_radius();

        Ok(sp)
    }

    /// Initializes all columns with random potential pools and permanences.
    fn initialize_columns(&mut self) {
        for column in 0..self.num_columns {
            let potential = self.init_map_potential(column);
            let permanences = self.init_permanences(potential.len());

            let segment = self.connections.create_segment(column as CellIdx, None);
            debug_assert_eq!(segment as usize, column);

            for (&input, &perm) in potential.iter().zip(&permanences) {
                self.connections
                    .create_synapse(segment, input as CellIdx, perm);
            }

            self.connections
                .raise_permanences_to_threshold(segment, self.stimulus_threshold);
        }
    }

    /// Maps a column to its potential pool of inputs.
    fn init_map_potential(&mut self, column: usize) -> Vec<usize> {
        let neighborhood = Topology::map_potential_pool(
            column,
            self.num_columns,
            self.num_inputs,
            self.potential_radius,
            self.wrap_around,
        );

        // Sample potential_pct of the neighborhood
        let num_potential = ((neighborhood.len() as Real) * self.potential_pct).round() as usize;
        let num_potential = num_potential.max(1);

        let mut sampled = self.rng.sample(neighborhood, num_potential);
        sampled.sort_unstable();
        sampled
    }

    /// Initializes permanences for a potential pool.
    fn init_permanences(&mut self, pool_size: usize) -> Vec<Permanence> {
        (0..pool_size)
            .map(|_| {
                if self.rng.get_real64() < f64::from(self.init_connected_pct) {
                    self.init_perm_connected()
                } else {
                    self.init_perm_non_connected()
                }
            })
            .collect()
    }

    /// Returns a random permanence for a connected synapse.
    fn init_perm_connected(&mut self) -> Permanence {
        let p = self.syn_perm_connected
            + (self.rng.get_real32() * self.syn_perm_active_inc / 4.0);
        p.min(MAX_PERMANENCE)
    }

    /// Returns a random permanence for a non-connected synapse.
    fn init_perm_non_connected(&mut self) -> Permanence {
        let p = self.syn_perm_connected * self.rng.get_real32();
        p.max(MIN_PERMANENCE)
    }

    /// The main compute method.
    ///
    /// Takes an input SDR and returns the SDR of active columns. If learning
    /// is enabled, also updates permanences, duty cycles and boost factors.
    ///
    /// # Errors
    ///
    /// Returns [`HtmError::InvalidInput`] if the input width does not match.
    pub fn compute(&mut self, input: &Sdr, learn: bool) -> Result<Sdr> {
        if input.size() != self.num_inputs {
            return Err(HtmError::InvalidInput(format!(
                "spatial pooler expects {} input bits, got {}",
                self.num_inputs,
                input.size()
            )));
        }

        self.update_bookkeeping_vars(learn);

        self.overlaps = self.connections.compute_activity(input.get_sparse());
        self.boost_overlaps();

        let active_columns = self.inhibit_columns();
        let active = Sdr::from_sparse_unchecked(self.num_columns, active_columns);

        if learn {
            self.adapt_synapses(input, &active);
            self.update_duty_cycles(&active);
            self.bump_up_weak_columns();
            self.update_boost_factors();

            if self.is_update_round() {
                self.update_inhibition_radius();
                self.update_min_duty_cycles();
            }
        }

        Ok(active)
    }

    /// Applies boost factors to overlap scores.
    fn boost_overlaps(&mut self) {
        self.boosted_overlaps.clear();
        self.boosted_overlaps.extend(
            self.overlaps
                .iter()
                .zip(&self.boost_factors)
                .map(|(&o, &b)| o as Real * b),
        );
    }

    /// Performs inhibition to select active columns, returned ascending.
    fn inhibit_columns(&self) -> Vec<CellIdx> {
        let mut active = if self.global_inhibition {
            self.inhibit_columns_global()
        } else {
            self.inhibit_columns_local()
        };
        active.sort_unstable();
        active
    }

    /// Global inhibition: select top columns from entire region.
    fn inhibit_columns_global(&self) -> Vec<CellIdx> {
        let num_active = ((self.num_columns as Real) * self.local_area_density).round() as usize;
        let num_active = num_active.max(1).min(self.num_columns);

        let mut columns: Vec<(CellIdx, Real)> = self
            .boosted_overlaps
            .iter()
            .enumerate()
            .map(|(i, &o)| (i as CellIdx, o))
            .collect();

        // Stable sort keeps the lower column first on equal overlap
        columns.sort_by(|a, b| b.1.total_cmp(&a.1));

        columns
            .into_iter()
            .take(num_active)
            .filter(|&(col, _)| self.overlaps[col as usize] >= self.stimulus_threshold)
            .map(|(col, _)| col)
            .collect()
    }

    /// Local inhibition: each column competes within its ring neighborhood.
    fn inhibit_columns_local(&self) -> Vec<CellIdx> {
        let mut active = Vec::new();

        for column in 0..self.num_columns {
            if self.overlaps[column] < self.stimulus_threshold {
                continue;
            }
            let overlap = self.boosted_overlaps[column];

            let neighbors = Topology::neighborhood(
                column,
                self.num_columns,
                self.inhibition_radius,
                self.wrap_around,
                false,
            );

            // A neighbor beats this column with a higher overlap, or an equal
            // overlap at a lower index.
            let num_stronger = neighbors
                .iter()
                .filter(|&&n| {
                    let other = self.boosted_overlaps[n];
                    other > overlap || (other == overlap && n < column)
                })
                .count();

            let num_active =
                (((neighbors.len() + 1) as Real) * self.local_area_density).round() as usize;

            if num_stronger < num_active.max(1) {
                active.push(column as CellIdx);
            }
        }

        active
    }

    /// Adapts the potential pools of active columns towards the input.
    fn adapt_synapses(&mut self, input: &Sdr, active: &Sdr) {
        let input_mask = input.get_dense();

        for &column in active.get_sparse() {
            let segment = column as Segment;
            self.connections.adapt_segment(
                segment,
                &input_mask,
                self.syn_perm_active_inc,
                self.syn_perm_inactive_dec,
                false,
            );
            self.connections
                .raise_permanences_to_threshold(segment, self.stimulus_threshold);
        }
    }

    /// Updates duty cycles as moving averages over `duty_cycle_period`.
    fn update_duty_cycles(&mut self, active: &Sdr) {
        let period = self.duty_cycle_period.min(self.iteration_learn_num).max(1) as Real;

        for (duty, &overlap) in self.overlap_duty_cycles.iter_mut().zip(&self.overlaps) {
            let value = if overlap > 0 { 1.0 } else { 0.0 };
            *duty = ((period - 1.0) * *duty + value) / period;
        }

        let active_mask = active.get_dense();
        for (duty, &is_active) in self.active_duty_cycles.iter_mut().zip(&active_mask) {
            let value = if is_active { 1.0 } else { 0.0 };
            *duty = ((period - 1.0) * *duty + value) / period;
        }
    }

    /// Increases permanences for columns with low overlap duty cycle.
    fn bump_up_weak_columns(&mut self) {
        for column in 0..self.num_columns {
            if self.overlap_duty_cycles[column] < self.min_overlap_duty_cycles[column] {
                self.connections
                    .bump_segment(column as Segment, self.syn_perm_below_stimulus_inc);
            }
        }
    }

    /// Updates boost factors based on active duty cycles.
    fn update_boost_factors(&mut self) {
        if self.boost_strength <= 0.0 {
            return;
        }

        for column in 0..self.num_columns {
            let target_density = if self.global_inhibition {
                self.local_area_density
            } else {
                let neighbors = self.inhibition_neighborhood(column);
                neighbors
                    .iter()
                    .map(|&n| self.active_duty_cycles[n])
                    .sum::<Real>()
                    / neighbors.len().max(1) as Real
            };

            self.boost_factors[column] =
                (self.boost_strength * (target_density - self.active_duty_cycles[column])).exp();
        }
    }

    fn inhibition_neighborhood(&self, column: usize) -> Vec<usize> {
        Topology::neighborhood(
            column,
            self.num_columns,
            self.inhibition_radius,
            self.wrap_around,
            true,
        )
    }

    /// Updates the inhibition radius based on average receptive field size.
    fn update_inhibition_radius(&mut self) {
        if self.global_inhibition {
            self.inhibition_radius = self.num_columns as UInt;
            return;
        }

        let total_span: Real = (0..self.num_columns)
            .map(|column| self.avg_connected_span_for_column(column))
            .sum();
        let avg_span = total_span / self.num_columns as Real;

        let columns_per_input = self.num_columns as Real / self.num_inputs as Real;

        let diameter = avg_span * columns_per_input;
        let radius = ((diameter - 1.0) / 2.0).round().max(1.0);
        self.inhibition_radius = radius as UInt;
    }

    /// Span of the connected inputs of a column.
    fn avg_connected_span_for_column(&self, column: usize) -> Real {
        let segment = column as Segment;
        let mut bounds: Option<(CellIdx, CellIdx)> = None;

        for &synapse in self.connections.synapses_for_segment(segment) {
            let data = self.connections.data_for_synapse(synapse);
            if data.permanence >= self.syn_perm_connected {
                let cell = data.presynaptic_cell;
                bounds = Some(match bounds {
                    None => (cell, cell),
                    Some((lo, hi)) => (lo.min(cell), hi.max(cell)),
                });
            }
        }

        bounds.map_or(0.0, |(lo, hi)| (hi - lo + 1) as Real)
    }

    /// Updates minimum duty cycles.
    fn update_min_duty_cycles(&mut self) {
        if self.global_inhibition {
            let max_overlap_duty = self
                .overlap_duty_cycles
                .iter()
                .copied()
                .fold(0.0_f32, Real::max);
            let min_overlap = self.min_pct_overlap_duty_cycles * max_overlap_duty;
            self.min_overlap_duty_cycles.fill(min_overlap);
        } else {
            for column in 0..self.num_columns {
                let max_neighbor_overlap = self
                    .inhibition_neighborhood(column)
                    .iter()
                    .map(|&n| self.overlap_duty_cycles[n])
                    .fold(0.0_f32, Real::max);

                self.min_overlap_duty_cycles[column] =
                    self.min_pct_overlap_duty_cycles * max_neighbor_overlap;
            }
        }
    }

    fn update_bookkeeping_vars(&mut self, learn: bool) {
        self.iteration_num += 1;
        if learn {
            self.iteration_learn_num += 1;
        }
    }

    fn is_update_round(&self) -> bool {
        self.iteration_num % self.update_period == 0
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Returns the number of inputs.
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Returns the number of columns.
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Returns the potential radius.
    pub fn potential_radius(&self) -> UInt {
        self.potential_radius
    }

    /// Returns whether global inhibition is enabled.
    pub fn global_inhibition(&self) -> bool {
        self.global_inhibition
    }

    /// Returns the local area density.
    pub fn local_area_density(&self) -> Real {
        self.local_area_density
    }

    /// Returns the inhibition radius.
    pub fn inhibition_radius(&self) -> UInt {
        self.inhibition_radius
    }

    /// Returns the current iteration number.
    pub fn iteration_num(&self) -> UInt {
        self.iteration_num
    }

    /// Returns the synapse permanence connected threshold.
    pub fn syn_perm_connected(&self) -> Permanence {
        self.syn_perm_connected
    }

    /// Returns the boost factors.
    pub fn boost_factors(&self) -> &[Real] {
        &self.boost_factors
    }

    /// Returns the overlap duty cycles.
    pub fn overlap_duty_cycles(&self) -> &[Real] {
        &self.overlap_duty_cycles
    }

    /// Returns the active duty cycles.
    pub fn active_duty_cycles(&self) -> &[Real] {
        &self.active_duty_cycles
    }

    /// Returns the raw overlaps from the last compute.
    pub fn overlaps(&self) -> &[u32] {
        &self.overlaps
    }

    /// Returns the boosted overlaps from the last compute.
    pub fn boosted_overlaps(&self) -> &[Real] {
        &self.boosted_overlaps
    }

    /// Returns a reference to the connections.
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// Gets the potential pool of a column as `(input, permanence)` pairs.
    pub fn get_permanences(&self, column: UInt) -> Vec<(CellIdx, Permanence)> {
        self.connections
            .synapses_for_segment(column as Segment)
            .iter()
            .map(|&s| {
                let data = self.connections.data_for_synapse(s);
                (data.presynaptic_cell, data.permanence)
            })
            .collect()
    }

    /// Gets connected counts for all columns.
    pub fn connected_counts(&self) -> Vec<UInt> {
        (0..self.num_columns)
            .map(|col| self.connections.data_for_segment(col as Segment).num_connected)
            .collect()
    }
}
