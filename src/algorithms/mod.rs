//! HTM algorithms implementation.
//!
//! This module contains the core algorithms of the anomaly pipeline:
//!
//! - **Connections**: The synaptic connectivity graph
//! - **Spatial Pooler**: Creates sparse representations from input patterns
//! - **Temporal Memory**: Learns temporal sequences
//! - **Anomaly**: Raw prediction error of one step
//! - **Anomaly Likelihood**: Calibrates raw scores against their recent history

mod anomaly;
mod anomaly_likelihood;
mod connections;
mod spatial_pooler;
mod temporal_memory;

pub use anomaly::Anomaly;
pub use anomaly_likelihood::{AnomalyLikelihood, AnomalyLikelihoodParams, Distribution};
pub use connections::{CellData, Connections, ConnectionsParams, SegmentData, SynapseData};
pub use spatial_pooler::{SpatialPooler, SpatialPoolerParams};
pub use temporal_memory::{TemporalMemory, TemporalMemoryParams};
