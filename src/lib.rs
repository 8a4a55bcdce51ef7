//! Canteen meal-plan service: a date-keyed plan cache refreshed from an
//! upstream source and served over a small JSON API.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
