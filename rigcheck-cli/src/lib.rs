//! rigcheck CLI library
//!
//! Exposes the command handlers, plan loader, and shell-command bodies so
//! that integration tests can drive them without spawning the binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod plan;
pub mod shell;
