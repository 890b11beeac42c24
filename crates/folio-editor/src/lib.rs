// SPDX-License-Identifier: AGPL-3.0-or-later
//! Folio Editor - Editing session and extension views
//!
//! This crate provides:
//! - Editing commands with snapshot undo/redo history
//! - The session controller that validates every change before it lands
//! - Debounced diagram editing with token-guarded remote validation
//! - The message bridge to externally hosted editing surfaces
//! - TOML configuration and tracing setup for embedding hosts

pub mod bridge;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod session;
pub mod telemetry;
pub mod views;

pub use bridge::{Bridge, BridgeInput, BridgeProtocolError, BridgeState, HostAction, SurfaceEvent};
pub use commands::Command;
pub use config::EditorConfig;
pub use context::{BridgeRequest, ContextReceivers, ExtensionContext};
pub use error::{CommandError, ConfigError, EditorError, Result};
pub use history::History;
pub use session::{EditingSession, ListenerId};
