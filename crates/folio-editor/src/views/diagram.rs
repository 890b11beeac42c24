// SPDX-License-Identifier: AGPL-3.0-or-later
//! Editing view for diagram-as-code blocks
//!
//! Keystrokes update the local buffer immediately. After the debounce window
//! the buffer is rendered and committed to the node (one command per window),
//! then sent for remote validation. The render/commit continuation and the
//! validation continuation each carry a token from the view's generator and
//! only land if their token is still the latest of its kind.
//!
//! Must be used from within a tokio runtime.

use crate::config::EditorConfig;
use crate::context::ExtensionContext;
use folio_core::extensions::{DiagramArtifact, DiagramRenderer, DIAGRAM_CODE_TYPE};
use folio_core::services::{
    ValidationRequest, ValidationResponse, ValidationService, ValidationServiceError,
};
use folio_core::{Attrs, NodePath};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

const UNKNOWN_VALIDATION_ERROR: &str = "Unknown validation error.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValidationStatus {
    #[default]
    Idle,
    Pending,
    Valid,
    Invalid(String),
    /// The service could not be reached; the next window retries
    Failed(String),
}

/// What the view currently shows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagramSnapshot {
    pub buffer: String,
    /// Source last written to the node
    pub committed: String,
    pub artifact: Option<DiagramArtifact>,
    pub render_error: Option<String>,
    pub validation: ValidationStatus,
}

#[derive(Default)]
struct DiagramState {
    snapshot: DiagramSnapshot,
    /// Where commits go; follows the node when it moves
    path: NodePath,
    next_token: u64,
    latest_render: Option<u64>,
    latest_validation: Option<u64>,
    in_flight: Vec<JoinHandle<()>>,
    closed: bool,
}

impl DiagramState {
    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn cancel_validation(&mut self) {
        self.latest_validation = None;
        for task in self.in_flight.drain(..) {
            task.abort();
        }
    }
}

/// Collaborators shared by the view and its background tasks
#[derive(Clone)]
struct Deps {
    ctx: ExtensionContext,
    renderer: Arc<dyn DiagramRenderer>,
    service: Arc<dyn ValidationService>,
}

pub struct DiagramView {
    shared: Arc<Mutex<DiagramState>>,
    deps: Deps,
    debounce: Duration,
    debounce_task: Option<JoinHandle<()>>,
}

fn lock(shared: &Mutex<DiagramState>) -> MutexGuard<'_, DiagramState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DiagramView {
    pub fn new(
        path: NodePath,
        source: &str,
        ctx: ExtensionContext,
        renderer: Arc<dyn DiagramRenderer>,
        service: Arc<dyn ValidationService>,
        config: &EditorConfig,
    ) -> Self {
        let mut state = DiagramState {
            path,
            ..DiagramState::default()
        };
        state.snapshot.buffer = source.to_string();
        state.snapshot.committed = source.to_string();
        render_into(&mut state.snapshot, renderer.as_ref());
        Self {
            shared: Arc::new(Mutex::new(state)),
            deps: Deps {
                ctx,
                renderer,
                service,
            },
            debounce: config.debounce(),
            debounce_task: None,
        }
    }

    pub fn path(&self) -> NodePath {
        lock(&self.shared).path.clone()
    }

    /// The node moved in the document. Pending commits follow it.
    pub fn set_path(&mut self, path: NodePath) {
        lock(&self.shared).path = path;
    }

    pub fn snapshot(&self) -> DiagramSnapshot {
        lock(&self.shared).snapshot.clone()
    }

    /// Replace the buffer and restart the debounce window
    pub fn input(&mut self, source: impl Into<String>) {
        let token = {
            let mut state = lock(&self.shared);
            state.snapshot.buffer = source.into();
            let token = state.issue_token();
            state.latest_render = Some(token);
            token
        };
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
        let shared = Arc::clone(&self.shared);
        let deps = self.deps.clone();
        let delay = self.debounce;
        self.debounce_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            settle(&shared, &deps, token);
        }));
    }

    /// Validate the current buffer now, outside the debounce cycle
    pub fn validate_now(&mut self) {
        let source = lock(&self.shared).snapshot.buffer.clone();
        start_validation(&self.shared, &self.deps, source);
    }

    /// The node's source changed. Our own commits echo back unchanged and
    /// are ignored; anything else (undo, remote load) replaces the buffer
    /// and cancels pending render and validation work.
    pub fn node_updated(&mut self, source: &str) {
        let mut state = lock(&self.shared);
        if state.snapshot.committed == source {
            return;
        }
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
        state.latest_render = None;
        state.cancel_validation();
        state.snapshot.validation = ValidationStatus::Idle;
        state.snapshot.committed = source.to_string();
        state.snapshot.buffer = source.to_string();
        render_into(&mut state.snapshot, self.deps.renderer.as_ref());
    }

    /// Stop all pending work. Late completions are discarded.
    pub fn close(&mut self) {
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
        let mut state = lock(&self.shared);
        state.closed = true;
        state.latest_render = None;
        state.cancel_validation();
    }
}

impl Drop for DiagramView {
    fn drop(&mut self) {
        self.close();
    }
}

fn render_into(snapshot: &mut DiagramSnapshot, renderer: &dyn DiagramRenderer) {
    if snapshot.buffer.trim().is_empty() {
        snapshot.artifact = None;
        snapshot.render_error = None;
        return;
    }
    match renderer.render(&snapshot.buffer) {
        Ok(artifact) => {
            snapshot.artifact = Some(artifact);
            snapshot.render_error = None;
        }
        Err(err) => {
            tracing::debug!(%err, "diagram render failed");
            snapshot.artifact = None;
            snapshot.render_error = Some(err.to_string());
        }
    }
}

/// End of a debounce window: render, commit, then start validation
fn settle(shared: &Arc<Mutex<DiagramState>>, deps: &Deps, token: u64) {
    let source = {
        let mut state = lock(shared);
        if state.closed || state.latest_render != Some(token) {
            tracing::trace!(token, latest = ?state.latest_render, "stale render discarded");
            return;
        }
        state.latest_render = None;
        render_into(&mut state.snapshot, deps.renderer.as_ref());

        let source = state.snapshot.buffer.clone();
        if source != state.snapshot.committed {
            let mut attrs = Attrs::new();
            attrs.insert("source".to_string(), source.clone().into());
            match deps
                .ctx
                .update_attrs(state.path.clone(), DIAGRAM_CODE_TYPE, attrs)
            {
                Ok(()) => state.snapshot.committed.clone_from(&source),
                Err(err) => tracing::warn!(%err, "diagram commit dropped"),
            }
        }
        source
    };
    start_validation(shared, deps, source);
}

fn start_validation(shared: &Arc<Mutex<DiagramState>>, deps: &Deps, source: String) {
    let mut state = lock(shared);
    if state.closed {
        return;
    }
    if source.trim().is_empty() {
        state.latest_validation = None;
        state.snapshot.validation = ValidationStatus::Idle;
        return;
    }

    let token = state.issue_token();
    state.latest_validation = Some(token);
    state.snapshot.validation = ValidationStatus::Pending;

    let task_shared = Arc::clone(shared);
    let service = Arc::clone(&deps.service);
    let task = tokio::spawn(async move {
        let result = service.validate(ValidationRequest { source }).await;
        apply_validation(&task_shared, token, result);
    });
    state.in_flight.retain(|t| !t.is_finished());
    state.in_flight.push(task);
}

fn apply_validation(
    shared: &Mutex<DiagramState>,
    token: u64,
    result: Result<ValidationResponse, ValidationServiceError>,
) {
    let mut state = lock(shared);
    if state.closed || state.latest_validation != Some(token) {
        tracing::trace!(token, latest = ?state.latest_validation, "stale validation response discarded");
        return;
    }
    state.snapshot.validation = match result {
        Ok(resp) if resp.is_valid => ValidationStatus::Valid,
        Ok(resp) => ValidationStatus::Invalid(
            resp.error_message
                .unwrap_or_else(|| UNKNOWN_VALIDATION_ERROR.to_string()),
        ),
        Err(err) => {
            tracing::debug!(%err, "diagram validation failed");
            ValidationStatus::Failed(err.to_string())
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use async_trait::async_trait;
    use folio_core::extensions::FlowchartRenderer;
    use folio_core::AttrValue;
    use std::collections::VecDeque;

    /// Answers with scripted delays and verdicts, in call order
    struct Scripted {
        replies: Mutex<VecDeque<(Duration, ValidationResponse)>>,
    }

    impl Scripted {
        fn new(replies: Vec<(u64, ValidationResponse)>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|(ms, r)| (Duration::from_millis(ms), r))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl ValidationService for Scripted {
        async fn validate(
            &self,
            _request: ValidationRequest,
        ) -> Result<ValidationResponse, ValidationServiceError> {
            let next = self.replies.lock().unwrap().pop_front();
            let (delay, reply) = next.unwrap_or((Duration::ZERO, ValidationResponse::valid()));
            tokio::time::sleep(delay).await;
            Ok(reply)
        }
    }

    fn view(service: Arc<dyn ValidationService>) -> (DiagramView, crate::context::ContextReceivers) {
        let (ctx, receivers) = ExtensionContext::channel();
        let view = DiagramView::new(
            NodePath::from([0]),
            "graph TD\nA-->B",
            ctx,
            Arc::new(FlowchartRenderer),
            service,
            &EditorConfig::default(),
        );
        (view, receivers)
    }

    fn source_update(path: NodePath, source: &str) -> Command {
        let mut attrs = Attrs::new();
        attrs.insert("source".into(), source.into());
        Command::UpdateAttrs {
            path,
            attrs,
            node_type: Some(DIAGRAM_CODE_TYPE.to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystrokes_coalesce_into_one_commit() {
        let (mut view, mut rx) = view(Scripted::new(vec![]));
        for source in ["graph LR", "graph LR\nA", "graph LR\nA-->C"] {
            view.input(source);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(rx.commands.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(800)).await;
        let command = rx.commands.try_recv().unwrap();
        assert_eq!(command, source_update(NodePath::from([0]), "graph LR\nA-->C"));
        assert!(rx.commands.try_recv().is_err());

        let snapshot = view.snapshot();
        assert_eq!(snapshot.committed, "graph LR\nA-->C");
        assert!(snapshot.artifact.is_some());
        assert_eq!(snapshot.validation, ValidationStatus::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_validation_is_discarded() {
        let service = Scripted::new(vec![
            (2000, ValidationResponse::invalid("old")),
            (10, ValidationResponse::valid()),
        ]);
        let (mut view, _rx) = view(service);

        view.input("graph TD\nA-->X");
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(view.snapshot().validation, ValidationStatus::Pending);

        view.input("graph TD\nA-->Y");
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(view.snapshot().validation, ValidationStatus::Valid);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(view.snapshot().validation, ValidationStatus::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_landing_after_newer_render_is_discarded() {
        let service = Scripted::new(vec![
            (1000, ValidationResponse::invalid("old")),
            (5000, ValidationResponse::valid()),
        ]);
        let (mut view, _rx) = view(service);

        view.input("graph TD\nA-->X");
        tokio::time::sleep(Duration::from_millis(800)).await;
        view.input("graph TD\nA-->Y-->Z");

        // The second window renders at 1550ms, the first validation lands at 1750ms
        tokio::time::sleep(Duration::from_millis(1200)).await;
        let snapshot = view.snapshot();
        assert_eq!(snapshot.committed, "graph TD\nA-->Y-->Z");
        assert_eq!(snapshot.artifact.map(|a| a.node_count), Some(3));
        assert_eq!(snapshot.validation, ValidationStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_render_window_is_discarded() {
        let (mut view, mut rx) = view(Scripted::new(vec![]));
        let stale = lock(&view.shared).issue_token();
        view.input("graph LR\nA-->B");

        settle(&view.shared, &view.deps, stale);
        assert!(rx.commands.try_recv().is_err());
        assert_eq!(view.snapshot().committed, "graph TD\nA-->B");

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(
            rx.commands.try_recv().unwrap(),
            source_update(NodePath::from([0]), "graph LR\nA-->B")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_update_cancels_pending_validation() {
        let service = Scripted::new(vec![(2000, ValidationResponse::invalid("stale"))]);
        let (mut view, _rx) = view(service);

        view.input("graph TD\nA-->Q");
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(view.snapshot().validation, ValidationStatus::Pending);

        // Undo restored the previous source
        view.node_updated("graph TD\nA-->B");
        assert_eq!(view.snapshot().validation, ValidationStatus::Idle);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        let snapshot = view.snapshot();
        assert_eq!(snapshot.validation, ValidationStatus::Idle);
        assert_eq!(snapshot.buffer, "graph TD\nA-->B");
        assert!(snapshot.artifact.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_commit_echo_keeps_validation() {
        let service = Scripted::new(vec![(100, ValidationResponse::valid())]);
        let (mut view, _rx) = view(service);

        view.input("graph TD\nA-->Q");
        tokio::time::sleep(Duration::from_millis(760)).await;
        view.node_updated("graph TD\nA-->Q");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(view.snapshot().validation, ValidationStatus::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commits_follow_moved_node() {
        let (mut view, mut rx) = view(Scripted::new(vec![]));
        view.input("graph LR\nA-->D");
        view.set_path(NodePath::from([2]));
        assert_eq!(view.path(), NodePath::from([2]));

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(
            rx.commands.try_recv().unwrap(),
            source_update(NodePath::from([2]), "graph LR\nA-->D")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_source_is_still_committed() {
        let service = Scripted::new(vec![(5, ValidationResponse::invalid("Parse error"))]);
        let (mut view, mut rx) = view(service);

        view.input("graph TD\nA-->");
        tokio::time::sleep(Duration::from_millis(800)).await;

        let snapshot = view.snapshot();
        assert!(snapshot.render_error.is_some());
        assert!(snapshot.artifact.is_none());
        assert_eq!(snapshot.buffer, "graph TD\nA-->");
        assert_eq!(snapshot.validation, ValidationStatus::Invalid("Parse error".into()));
        let Command::UpdateAttrs { attrs, .. } = rx.commands.try_recv().unwrap() else {
            panic!("expected attribute update");
        };
        assert_eq!(attrs["source"], AttrValue::from("graph TD\nA-->"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_clears_render() {
        let (mut view, _rx) = view(Scripted::new(vec![]));
        view.input("   ");
        tokio::time::sleep(Duration::from_millis(800)).await;
        let snapshot = view.snapshot();
        assert!(snapshot.artifact.is_none());
        assert!(snapshot.render_error.is_none());
        assert_eq!(snapshot.validation, ValidationStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_commit() {
        let (mut view, mut rx) = view(Scripted::new(vec![]));
        view.input("graph TD\nA-->Z");
        drop(view);
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(rx.commands.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_now() {
        let service = Scripted::new(vec![(0, ValidationResponse::invalid("bad arrow"))]);
        let (mut view, mut rx) = view(service);
        view.validate_now();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(view.snapshot().validation, ValidationStatus::Invalid("bad arrow".into()));
        assert!(rx.commands.try_recv().is_err());
    }
}
