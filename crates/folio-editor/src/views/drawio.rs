// SPDX-License-Identifier: AGPL-3.0-or-later
//! Editing view for externally edited diagrams
//!
//! The view only knows the payload and the node's location. Editing happens
//! in an external surface opened by the host in response to a bridge request.

use crate::context::ExtensionContext;
use crate::error::Result;
use folio_core::extensions::EXTERNAL_DIAGRAM_TYPE;
use folio_core::NodePath;

#[derive(Debug, Clone)]
pub struct ExternalDiagramView {
    path: NodePath,
    payload: String,
    ctx: ExtensionContext,
}

impl ExternalDiagramView {
    pub fn new(path: NodePath, payload: impl Into<String>, ctx: ExtensionContext) -> Self {
        Self {
            path,
            payload: payload.into(),
            ctx,
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The node moved in the document
    pub fn set_path(&mut self, path: NodePath) {
        self.path = path;
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Ask the host to open the external surface seeded with the payload
    pub fn request_edit(&self) -> Result<()> {
        tracing::debug!(path = %self.path, bytes = self.payload.len(), "external edit requested");
        self.ctx
            .request_bridge(self.path.clone(), EXTERNAL_DIAGRAM_TYPE, self.payload.clone())
    }

    /// The node's payload changed (a bridge commit landed, or undo)
    pub fn node_updated(&mut self, payload: &str) {
        if self.payload != payload {
            self.payload = payload.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BridgeRequest;

    #[test]
    fn test_request_edit_sends_payload_and_path() {
        let (ctx, mut rx) = ExtensionContext::channel();
        let mut view = ExternalDiagramView::new(NodePath::from([2]), "<mxfile/>", ctx);
        view.set_path(NodePath::from([4]));
        view.request_edit().unwrap();
        assert_eq!(
            rx.bridge_requests.try_recv().unwrap(),
            BridgeRequest {
                path: NodePath::from([4]),
                node_type: "drawioDiagram".into(),
                payload: "<mxfile/>".into(),
            }
        );
    }
}
