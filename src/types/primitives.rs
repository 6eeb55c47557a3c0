//! Primitive type definitions shared by the HTM algorithms.

/// 32-bit unsigned integer.
pub type UInt32 = u32;

/// Default unsigned integer type.
pub type UInt = UInt32;

/// Floating point type used for permanences, duty cycles and boost factors.
pub type Real = f32;

/// Floating point type used for scores and likelihood statistics.
pub type Score = f64;

/// Index type for cells in the connections graph.
/// Must match `ElemSparse` for SDR compatibility.
pub type CellIdx = UInt32;

/// Unique identifier for a segment in the connections flat list.
pub type Segment = UInt32;

/// Unique identifier for a synapse in the connections flat list.
pub type Synapse = UInt32;

/// Synapse permanence value (0.0 to 1.0).
pub type Permanence = Real;

/// Minimum permanence value.
pub const MIN_PERMANENCE: Permanence = 0.0;

/// Maximum permanence value.
pub const MAX_PERMANENCE: Permanence = 1.0;

/// Epsilon for permanence comparisons. A synapse at or below this is dead.
pub const EPSILON: Permanence = 1e-6;

/// Element type for sparse SDR representation (indices).
pub type ElemSparse = UInt32;
