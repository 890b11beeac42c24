// SPDX-License-Identifier: AGPL-3.0-or-later
//! Channels handed to extension views
//!
//! Views never touch the session directly. They send commands and bridge
//! requests over these channels; the host drains them in order.

use crate::commands::Command;
use crate::error::{EditorError, Result};
use folio_core::{Attrs, NodePath};
use tokio::sync::mpsc;

/// Ask the host to open an external editing surface for a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub path: NodePath,
    pub node_type: String,
    pub payload: String,
}

#[derive(Debug, Clone)]
pub struct ExtensionContext {
    commands: mpsc::UnboundedSender<Command>,
    bridge_requests: mpsc::UnboundedSender<BridgeRequest>,
}

/// Host side of an [`ExtensionContext`]
#[derive(Debug)]
pub struct ContextReceivers {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub bridge_requests: mpsc::UnboundedReceiver<BridgeRequest>,
}

impl ExtensionContext {
    pub fn channel() -> (Self, ContextReceivers) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (bridge_tx, bridge_rx) = mpsc::unbounded_channel();
        (
            Self {
                commands: commands_tx,
                bridge_requests: bridge_tx,
            },
            ContextReceivers {
                commands: commands_rx,
                bridge_requests: bridge_rx,
            },
        )
    }

    pub fn send_command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| EditorError::ChannelClosed)
    }

    /// Update attributes of the `node_type` node at `path`. The command is
    /// rejected if another kind of node sits there by the time it applies.
    pub fn update_attrs(&self, path: NodePath, node_type: &str, attrs: Attrs) -> Result<()> {
        self.send_command(Command::UpdateAttrs {
            path,
            attrs,
            node_type: Some(node_type.to_string()),
        })
    }

    pub fn request_bridge(
        &self,
        path: NodePath,
        node_type: &str,
        payload: impl Into<String>,
    ) -> Result<()> {
        self.bridge_requests
            .send(BridgeRequest {
                path,
                node_type: node_type.to_string(),
                payload: payload.into(),
            })
            .map_err(|_| EditorError::ChannelClosed)
    }
}
