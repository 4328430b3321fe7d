//! Pricing formula engine: versioned FOB formulas + the cost buildup.

pub mod buildup;
pub mod formula;

pub use buildup::*;
pub use formula::*;
