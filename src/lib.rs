//! Street tree health dashboard for New York City.
//!
//! Loads the tree census partitions into a [`data::Dataset`], turns species
//! and borough selections into proportion tables with the aggregators in
//! [`processing`], and renders those tables as charts served over HTTP.

pub mod types;
pub mod config;
pub mod data;
pub mod processing;
pub mod render;
pub mod server;

pub use data::Dataset;
pub use processing::{aggregate_condition_proportions, aggregate_steward_health};
pub use types::{Borough, HeatTable, Health, ProportionTable, Steward, TreeRecord};
