//! Reporting: formatted terminal output for every `fp` subcommand.

pub mod format;

pub use format::*;
