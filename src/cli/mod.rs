//! CLI Module
//!
//! Provides exit codes and output formatting for the command-line front-end.

pub mod exit_codes;
pub mod output;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use output::{format_output, OutputFormat};
