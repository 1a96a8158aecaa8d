//! # `folio_sync`
//!
//! Hosting layer for the folio synchronization engine: one single-writer
//! agent task per paper, a registry that spawns and addresses them, and
//! environment-driven configuration. A transport (HTTP, WebSocket, tests)
//! talks to papers exclusively through [`PaperHandle`]s.

#![warn(missing_docs)]

/// Per-paper agent task and its request protocol.
pub mod agent;

/// Environment configuration.
pub mod config;

/// Directory of live paper agents.
pub mod registry;

pub use agent::{PaperAgent, PaperHandle, PaperRequest};
pub use config::{Config, ConfigError};
pub use registry::PaperRegistry;
