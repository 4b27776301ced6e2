//! CLI module
//!
//! Command-line interface for the SQL source.
//!
//! # Commands
//!
//! - `check` - Test connection to the database
//! - `discover` - List tables and their columns
//! - `plan` - Show how streams would be partitioned
//! - `read` - Extract data from streams

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
