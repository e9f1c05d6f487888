//! wgforge command-line interface.
//!
//! Thin layer over `wgforge-engine` and `wgforge-keystore`: document loading,
//! argument parsing, and output formatting.

#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;

pub use error::CliError;
