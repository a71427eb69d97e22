//! ItemSQL Shell
//!
//! Runs SELECT statements from the command line against a virtual data
//! store of monitoring-server tables.

pub mod command;
pub mod store;

pub use command::{OutputFormat, ShellCommand, ShellRequest, load_config, render_json, render_text};
pub use store::VirtualDataStore;
