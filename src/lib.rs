//! `fair-price` library crate.
//!
//! The binary (`fp`) is a thin wrapper around this library so that:
//!
//! - the pricing pipeline is testable without spawning processes
//! - sources, caches and audit sinks can be swapped for in-memory ones
//!
//! Data flows source adapter → validator → pricing engine → analytics → audit.

pub mod analysis;
pub mod app;
pub mod audit;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod pricing;
pub mod report;
pub mod validate;
