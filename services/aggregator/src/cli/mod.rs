//! Command-line interface for the aggregation pipeline.

mod commands;
mod error;
mod output;

pub use commands::Cli;
pub use error::print_error;
