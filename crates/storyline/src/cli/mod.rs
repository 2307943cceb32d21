//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the storyline binary.

mod commands;
mod session;

pub use commands::{Cli, Commands};
pub use session::Session;
