//! Utility modules for the HTM library.
//!
//! Seeded random number generation and column/input topology.

mod random;
mod topology;

pub use random::Random;
pub use topology::{Topology, WrappingMode};
