//! CLI module for authgate.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, GlobalArgs, ShellType};
