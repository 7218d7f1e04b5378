//! Optimization drivers. Given a checker, a driver searches for a
//! maximally relaxed ordering assignment of a module.

pub mod ddmin;
pub mod delta;
pub mod driver;
pub mod filter;
pub mod lr;
pub mod stats;

pub use driver::{Driver, DriverConfig, MutableModule, OptimizerError, Solution, Strategy};
pub use filter::{FilterMode, FilterSet};
pub use stats::{StatKind, Stats};
