//! Neighbor tables and topology database for the abstraction layer.
//!
//! Each local interface owns a [`NeighborTable`] of the 1905 devices heard on
//! it; membership changes in those tables drive topology notifications. The
//! [`TopologyDatabase`] keeps what remote devices reported about themselves in
//! their topology responses, for consumers building a topology map.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod devices;
pub mod neighbor;

pub use devices::*;
pub use neighbor::{NeighborEntry, NeighborTable, Observation};
