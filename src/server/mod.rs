//! Server module for labelsync
//!
//! Contains configuration loading, the composition root for CLI commands and
//! the session service run loop.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `cli`: Orchestrator builder for CLI commands
//! - `init`: Session service initialization and run loop

mod cli;
pub mod config;
mod init;
mod loader;

// Re-export public API
pub use cli::build_orchestrator_for_cli;
pub use init::{build_app, run, wait_for_shutdown_signal};
pub use loader::load_config;
