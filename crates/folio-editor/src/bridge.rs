// SPDX-License-Identifier: AGPL-3.0-or-later
//! External editor bridge
//!
//! Synchronizes one node's opaque payload with an externally hosted editing
//! surface over JSON messages. [`Bridge`] is a pure state machine: it consumes
//! surface messages and returns the host actions to post. [`drive`] runs it
//! against channels with the close timeout.
//!
//! ```text
//! Closed -> Requesting -> Open <-> SyncPending
//!                          |
//!                          v
//!                       Closing -> Closed
//! ```

use crate::config::EditorConfig;
use crate::context::{BridgeRequest, ExtensionContext};
use folio_core::NodePath;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Closed,
    /// Waiting for the surface to announce readiness
    Requesting,
    Open,
    /// A save is being committed
    SyncPending,
    /// Export requested, waiting for the reply or the timeout
    Closing,
}

/// Message from the surface
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum SurfaceEvent {
    Init,
    Load,
    Save {
        #[serde(alias = "xml")]
        payload: String,
    },
    Autosave {
        #[serde(alias = "xml")]
        payload: String,
    },
    Export {
        #[serde(default, alias = "xml")]
        payload: Option<String>,
    },
    Exit,
}

/// Message to the surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum HostAction {
    Load { payload: String },
    Configure { config: serde_json::Value },
    Export { format: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeProtocolError {
    #[error("message from untrusted source `{0}`")]
    UntrustedSource(String),

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unexpected `{event}` while {state:?}")]
    UnexpectedEvent {
        event: &'static str,
        state: BridgeState,
    },
}

type Commit = Box<dyn FnMut(&NodePath, String) + Send>;

pub struct Bridge {
    state: BridgeState,
    origin: String,
    path: NodePath,
    latest_payload: String,
    pending_load: Option<String>,
    configure: Option<serde_json::Value>,
    commit: Commit,
}

impl SurfaceEvent {
    fn name(&self) -> &'static str {
        match self {
            SurfaceEvent::Init => "init",
            SurfaceEvent::Load => "load",
            SurfaceEvent::Save { .. } => "save",
            SurfaceEvent::Autosave { .. } => "autosave",
            SurfaceEvent::Export { .. } => "export",
            SurfaceEvent::Exit => "exit",
        }
    }
}

impl Bridge {
    /// Start a session seeded with `request`'s payload. `commit` receives
    /// the node's current path and every payload the surface saves.
    pub fn open(
        request: BridgeRequest,
        origin: impl Into<String>,
        configure: Option<serde_json::Value>,
        commit: impl FnMut(&NodePath, String) + Send + 'static,
    ) -> Self {
        tracing::debug!(path = %request.path, "bridge requested");
        Self {
            state: BridgeState::Requesting,
            origin: origin.into(),
            path: request.path,
            latest_payload: request.payload.clone(),
            pending_load: Some(request.payload),
            configure,
            commit: Box::new(commit),
        }
    }

    /// Bridge committing saved payloads as `attr` updates through `ctx`
    pub fn with_context(
        request: BridgeRequest,
        origin: impl Into<String>,
        configure: Option<serde_json::Value>,
        ctx: ExtensionContext,
        attr: &'static str,
    ) -> Self {
        let node_type = request.node_type.clone();
        Self::open(request, origin, configure, move |path, payload| {
            let mut attrs = folio_core::Attrs::new();
            attrs.insert(attr.to_string(), payload.into());
            if let Err(err) = ctx.update_attrs(path.clone(), &node_type, attrs) {
                tracing::warn!(%err, "bridge commit dropped");
            }
        })
    }

    /// [`Bridge::with_context`] using the configured surface origin and
    /// configure payload
    pub fn from_config(
        request: BridgeRequest,
        config: &EditorConfig,
        ctx: ExtensionContext,
        attr: &'static str,
    ) -> Self {
        Self::with_context(
            request,
            config.surface_origin.clone(),
            config.surface_config.clone(),
            ctx,
            attr,
        )
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The node moved; later commits target `path`
    pub fn set_path(&mut self, path: NodePath) {
        self.path = path;
    }

    /// Last payload known to the host
    pub fn latest_payload(&self) -> &str {
        &self.latest_payload
    }

    /// Handle a raw surface message. Protocol errors are logged and the
    /// message is ignored.
    pub fn receive(&mut self, source: &str, data: &str) -> Vec<HostAction> {
        match self.try_receive(source, data) {
            Ok(actions) => actions,
            Err(err) => {
                tracing::warn!(%err, "ignoring bridge message");
                Vec::new()
            }
        }
    }

    pub fn try_receive(
        &mut self,
        source: &str,
        data: &str,
    ) -> Result<Vec<HostAction>, BridgeProtocolError> {
        if source != self.origin {
            return Err(BridgeProtocolError::UntrustedSource(source.to_string()));
        }
        let event: SurfaceEvent = serde_json::from_str(data)?;
        self.handle(event)
    }

    fn handle(&mut self, event: SurfaceEvent) -> Result<Vec<HostAction>, BridgeProtocolError> {
        let unexpected = |event: &SurfaceEvent, state| BridgeProtocolError::UnexpectedEvent {
            event: event.name(),
            state,
        };

        match (self.state, event) {
            (BridgeState::Closed, event) => Err(unexpected(&event, BridgeState::Closed)),

            (BridgeState::Requesting, SurfaceEvent::Init) => {
                let mut actions = Vec::with_capacity(2);
                if let Some(payload) = self.pending_load.take() {
                    actions.push(HostAction::Load { payload });
                }
                if let Some(config) = self.configure.take() {
                    actions.push(HostAction::Configure { config });
                }
                self.state = BridgeState::Open;
                tracing::debug!(path = %self.path, "bridge open");
                Ok(actions)
            }

            (_, SurfaceEvent::Load) => {
                tracing::debug!(path = %self.path, "surface loaded payload");
                Ok(Vec::new())
            }

            (_, SurfaceEvent::Exit) => {
                self.close("exit");
                Ok(Vec::new())
            }

            (
                state @ (BridgeState::Open | BridgeState::Closing),
                SurfaceEvent::Save { payload } | SurfaceEvent::Autosave { payload },
            ) => {
                self.state = BridgeState::SyncPending;
                self.commit_payload(payload);
                self.state = state;
                Ok(Vec::new())
            }

            (BridgeState::Open | BridgeState::Closing, SurfaceEvent::Export { payload }) => {
                let payload = payload.unwrap_or_else(|| self.latest_payload.clone());
                self.commit_payload(payload);
                self.close("export");
                Ok(Vec::new())
            }

            (state, event) => Err(unexpected(&event, state)),
        }
    }

    /// Ask the surface for its final payload. Before the surface is ready
    /// this closes immediately and the buffered load is dropped.
    pub fn request_close(&mut self) -> Vec<HostAction> {
        match self.state {
            BridgeState::Requesting => {
                self.close("cancelled before ready");
                Vec::new()
            }
            BridgeState::Open | BridgeState::SyncPending => {
                self.state = BridgeState::Closing;
                vec![HostAction::Export {
                    format: "xml".to_string(),
                }]
            }
            BridgeState::Closing | BridgeState::Closed => Vec::new(),
        }
    }

    /// The surface never answered the export request
    pub fn close_timed_out(&mut self) {
        if self.state == BridgeState::Closing {
            self.close("close timeout");
        }
    }

    fn commit_payload(&mut self, payload: String) {
        self.latest_payload.clone_from(&payload);
        (self.commit)(&self.path, payload);
    }

    fn close(&mut self, reason: &str) {
        self.pending_load = None;
        self.state = BridgeState::Closed;
        tracing::debug!(path = %self.path, reason, "bridge closed");
    }
}

/// Input to a running bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeInput {
    Message { source: String, data: String },
    RequestClose,
    /// The edited node moved in the document
    Relocate(NodePath),
}

/// Run a bridge until it closes. Host actions are posted to `outbox` as
/// JSON. Closing waits at most `close_timeout` for the surface's reply.
pub async fn drive(
    mut bridge: Bridge,
    mut inbox: mpsc::UnboundedReceiver<BridgeInput>,
    outbox: mpsc::UnboundedSender<String>,
    close_timeout: Duration,
) -> Bridge {
    let mut deadline: Option<Instant> = None;

    while bridge.state() != BridgeState::Closed {
        let input = match deadline {
            Some(at) => match tokio::time::timeout_at(at, inbox.recv()).await {
                Ok(input) => input,
                Err(_) => {
                    bridge.close_timed_out();
                    break;
                }
            },
            None => inbox.recv().await,
        };

        let actions = match input {
            Some(BridgeInput::Message { source, data }) => bridge.receive(&source, &data),
            Some(BridgeInput::Relocate(path)) => {
                bridge.set_path(path);
                Vec::new()
            }
            Some(BridgeInput::RequestClose) => {
                let actions = bridge.request_close();
                if bridge.state() == BridgeState::Closing && deadline.is_none() {
                    deadline = Some(Instant::now() + close_timeout);
                }
                actions
            }
            None => {
                // Host went away: treat as a cancel without waiting
                bridge.request_close();
                bridge.close_timed_out();
                break;
            }
        };

        for action in actions {
            match serde_json::to_string(&action) {
                Ok(json) => {
                    if outbox.send(json).is_err() {
                        tracing::warn!("surface outbox closed");
                    }
                }
                Err(err) => tracing::warn!(%err, "unencodable host action"),
            }
        }
    }
    bridge
}

/// Host side of a bridge running on the tokio runtime
pub struct BridgeHandle {
    /// Surface messages, close requests and relocations
    pub inbox: mpsc::UnboundedSender<BridgeInput>,
    /// Host actions, JSON encoded, to post to the surface
    pub outbox: mpsc::UnboundedReceiver<String>,
    pub task: JoinHandle<Bridge>,
}

/// Spawn [`drive`] with the configured close timeout
pub fn spawn(bridge: Bridge, config: &EditorConfig) -> BridgeHandle {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(drive(
        bridge,
        inbox_rx,
        outbox_tx,
        config.bridge_close_timeout(),
    ));
    BridgeHandle {
        inbox: inbox_tx,
        outbox: outbox_rx,
        task,
    }
}
