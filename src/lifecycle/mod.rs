//! Quote lifecycle: the legal status graph and per-lineage ordering.

pub mod state;
pub mod workers;

pub use state::*;
pub use workers::*;
