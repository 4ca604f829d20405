//! CLI module
//!
//! Operator command line for the staging loader.
//!
//! # Commands
//!
//! - `run` - Extract and load entities
//! - `reprocess` - Replay failed or chosen items
//! - `failures` - List the failure ledger
//! - `watermarks` - List stored watermarks
//! - `runs` - List recent runs
//! - `check` - Validate settings, database and credentials
//! - `entities` - List the entity catalog
//! - `init-token` - Exchange an authorization code for tokens

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;
