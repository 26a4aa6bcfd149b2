//! Standardization: pick one value per canonical field, score the
//! components, reconcile line items, and decide the quote's status.

pub mod confidence;
pub mod mapper;
pub mod reconcile;

pub use confidence::*;
pub use mapper::*;
pub use reconcile::*;
