//! `Support` reconciliation: claim, run or replay feedback per workflow,
//! settle and persist.

mod controller;
pub mod status;

pub use controller::{reconcile_key, reconcile_support};
