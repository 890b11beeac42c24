// SPDX-License-Identifier: AGPL-3.0-or-later
//! Editing session controller
//!
//! Owns the current snapshot and its history. Every change goes through
//! [`EditingSession::apply_command`]; the result must validate against the
//! schema before it replaces the current snapshot.

use crate::commands::Command;
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::history::History;
use folio_core::formats::{deserialize_from_persisted, serialize_to_markup, serialize_to_persisted};
use folio_core::{ExtensionRegistry, Node, SerializationError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&Arc<Node>) + Send>;

pub struct EditingSession {
    registry: Arc<ExtensionRegistry>,
    current: Arc<Node>,
    history: History,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl EditingSession {
    /// Session holding the default document (one empty paragraph)
    pub fn new(registry: Arc<ExtensionRegistry>, config: &EditorConfig) -> Self {
        Self {
            registry,
            current: Arc::new(Node::empty_doc()),
            history: History::with_max_levels(config.max_undo_levels),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Replace the document with a persisted one. History is cleared.
    pub fn load(&mut self, persisted: &str) -> Result<Arc<Node>> {
        let doc = deserialize_from_persisted(self.registry.schema(), persisted)?;
        self.current = Arc::new(doc);
        self.history.clear();
        tracing::debug!(words = self.current.word_count(), "document loaded");
        self.notify();
        Ok(self.current_doc())
    }

    pub fn current_doc(&self) -> Arc<Node> {
        Arc::clone(&self.current)
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Apply a command. On any error the session is left untouched.
    pub fn apply_command(&mut self, command: Command) -> Result<Arc<Node>> {
        let schema = self.registry.schema();
        let next = command.apply(&self.current, schema)?;
        schema.validate(&next).map_err(EditorError::Rejected)?;

        if next == *self.current {
            tracing::trace!(command = command.name(), "command changed nothing");
            return Ok(self.current_doc());
        }

        let previous = std::mem::replace(&mut self.current, Arc::new(next));
        self.history.record(previous, command.name());
        tracing::debug!(command = command.name(), "command applied");
        self.notify();
        Ok(self.current_doc())
    }

    pub fn undo(&mut self) -> Option<Arc<Node>> {
        let restored = self.history.undo(self.current_doc())?;
        self.current = restored;
        self.notify();
        Some(self.current_doc())
    }

    pub fn redo(&mut self) -> Option<Arc<Node>> {
        let restored = self.history.redo(self.current_doc())?;
        self.current = restored;
        self.notify();
        Some(self.current_doc())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Register a listener called with every new current snapshot
    pub fn on_change<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<Node>) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Validate and serialize the current document
    pub fn save(&self) -> Result<String> {
        self.registry
            .schema()
            .validate(&self.current)
            .map_err(SerializationError::Invalid)?;
        Ok(serialize_to_persisted(&self.current)?)
    }

    pub fn to_markup(&self) -> Result<String> {
        Ok(serialize_to_markup(&self.registry, &self.current)?)
    }

    /// Apply every command queued by extension views, in order.
    /// Rejected commands are logged and skipped. Returns how many applied.
    pub fn apply_pending(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) -> usize {
        let mut applied = 0;
        while let Ok(command) = commands.try_recv() {
            let name = command.name();
            match self.apply_command(command) {
                Ok(_) => applied += 1,
                Err(err) => tracing::warn!(command = name, %err, "queued command rejected"),
            }
        }
        applied
    }

    fn notify(&self) {
        for (_, listener) in &self.listeners {
            listener(&self.current);
        }
    }
}

impl fmt::Debug for EditingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditingSession")
            .field("current", &self.current)
            .field("history", &self.history)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{Mark, NodePath};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> EditingSession {
        EditingSession::new(
            Arc::new(ExtensionRegistry::standard()),
            &EditorConfig::default(),
        )
    }

    #[test]
    fn test_starts_with_empty_doc() {
        let session = session();
        assert_eq!(*session.current_doc(), Node::empty_doc());
        assert!(!session.can_undo());
    }

    #[test]
    fn test_rejected_command_leaves_state() {
        let mut session = session();
        let before = session.current_doc();
        let err = session
            .apply_command(Command::InsertNode {
                parent: NodePath::from([0]),
                index: 0,
                node: Node::paragraph(vec![]),
            })
            .unwrap_err();
        assert!(matches!(err, EditorError::Rejected(_)));
        assert!(Arc::ptr_eq(&before, &session.current_doc()));
        assert!(!session.can_undo());
    }

    #[test]
    fn test_listeners() {
        let mut session = session();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let id = session.on_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        session
            .apply_command(Command::InsertText {
                path: NodePath::from([0]),
                offset: 0,
                text: "hi".into(),
            })
            .unwrap();
        session.undo();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(session.remove_listener(id));
        assert!(!session.remove_listener(id));
        session.redo();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_save_rejects_disallowed_mark() {
        let mut session = session();
        session
            .load(r#"{"type":"doc","content":[{"type":"codeBlock","attrs":{"language":null},"content":[{"type":"text","text":"x"}]}]}"#)
            .unwrap();
        let err = session
            .apply_command(Command::ToggleMark {
                path: NodePath::from([0]),
                from: 0,
                to: 1,
                mark: Mark::new("bold"),
            })
            .unwrap_err();
        assert!(matches!(err, EditorError::Rejected(_)));
        assert!(session.save().is_ok());
    }
}
