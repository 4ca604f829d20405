// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # stagesync
//!
//! Incremental extraction from a paginated REST API into a DuckDB
//! staging area, with idempotent loads and a failure ledger.
//!
//! ## Features
//!
//! - **Watermarks**: per entity and stage, advanced only after a clean run
//! - **Windows**: incremental windows with a safety margin, or fixed full bounds
//! - **Item isolation**: a failing item is recorded, the run continues
//! - **Batched upserts**: keyed on the natural key, reruns never duplicate
//! - **Reprocessing**: replay unresolved failures or hand-picked ids
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagesync::catalog;
//! use stagesync::database::StagingDatabase;
//! use stagesync::engine::{EntityDescriptor, RunController};
//! use std::sync::Arc;
//!
//! let db = Arc::new(StagingDatabase::open("staging.duckdb")?);
//! let controller = RunController::new(options, db.clone(), db.clone(), db.clone(), db);
//! let spec = catalog::find("product")?;
//! let entity = EntityDescriptor::from_spec(spec, source);
//! let report = controller.run(&entity).await?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      RunController                              │
//! │  window → crawl → map → buffer → upsert → advance watermark     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │  Window  │  Crawler  │    Buffer     │  Ledger   │  Database   │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Margin   │ pagina    │ Threshold     │ Failures  │ DuckDB      │
//! │ Drift    │ limite    │ Upsert        │ Runs      │ Control     │
//! │ Bounds   │ Isolation │ Commit refs   │ Resolve   │ Staging     │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types, load modes and clocks
pub mod types;

/// Settings file and environment
pub mod config;

/// Extraction window calculation
pub mod window;

/// Watermark storage
pub mod state;

/// Failure and run ledgers
pub mod ledger;

/// Per-entity record mappers
pub mod mapping;

/// OAuth2 token management
pub mod auth;

/// HTTP client with spacing and retry
pub mod http;

/// Upstream entity sources
pub mod source;

/// Entity catalog
pub mod catalog;

/// Paginated crawler
pub mod crawler;

/// Batch upsert buffer
pub mod buffer;

/// Run controller
pub mod engine;

/// Failure reprocessing
pub mod reprocess;

/// DuckDB staging and control tables
pub mod database;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::{LoadOptions, Settings};
pub use database::StagingDatabase;
pub use engine::{EntityDescriptor, RunController, RunReport};
pub use reprocess::{ReprocessReport, Reprocessor};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
