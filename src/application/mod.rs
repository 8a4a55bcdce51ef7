//! Application services: plan lookups, reconciliation and the fetch job.

pub mod catalog;
pub mod error;
pub mod fixup;
pub mod jobs;
pub mod plans;
pub mod source;
