// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tracing subscriber setup for hosts embedding the editor

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives
pub const LOG_ENV: &str = "FOLIO_LOG";

/// Install a fmt subscriber filtered by `FOLIO_LOG` (default `info`).
/// Returns false when a global subscriber is already set.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
