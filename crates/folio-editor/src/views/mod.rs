// SPDX-License-Identifier: AGPL-3.0-or-later
//! Editing views for the extension node types

pub mod diagram;
pub mod drawio;
pub mod placeholder;

pub use diagram::{DiagramSnapshot, DiagramView, ValidationStatus};
pub use drawio::ExternalDiagramView;
pub use placeholder::{DetailState, PlaceholderView};
