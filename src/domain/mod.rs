//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - market rows before (`RawTable`) and after (`MarketObservation`) validation
//! - cost-buildup inputs and their perturbable parameters (`CostInputs`, `CostParam`)
//! - run configuration (`PipelineConfig`, `CachePolicy`, `FormulaSelection`)

pub mod types;

pub use types::*;
