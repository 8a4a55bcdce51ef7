//! Domain layer types and invariants.

pub mod catalog;
pub mod date;
pub mod error;
pub mod plans;
