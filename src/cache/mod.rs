//! Budgeted model residency.
//!
//! - [`model`]: the `Model` trait and optional memory-saving capabilities
//! - [`manager`]: ResourceManager, the loaded-models table and admission control

pub mod manager;
pub mod model;
