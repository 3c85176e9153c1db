use crate::app::AppContext;
use crate::command::{Confirm, Removal};
use crate::error::{BoardError, ValidationError};
use crate::storage::{Change, Persisted};
use crate::{normalize_text, Connection, WorkflowDocument, WorkflowDraft, WorkflowPatch, WorkflowTask};
use tracing::{debug, info};

/// Nodes and edges of the workflow diagram.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowStore {
    doc: WorkflowDocument,
}

impl WorkflowStore {
    pub fn new(doc: WorkflowDocument) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &WorkflowDocument {
        &self.doc
    }

    pub fn nodes(&self) -> &[WorkflowTask] {
        &self.doc.tasks
    }

    pub fn connections(&self) -> &[Connection] {
        &self.doc.connections
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowTask> {
        self.doc.tasks.iter().find(|node| node.id == id)
    }

    pub fn has_connection(&self, from: &str, to: &str) -> bool {
        self.doc
            .connections
            .iter()
            .any(|edge| edge.from == from && edge.to == to)
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowTask> {
        self.doc.tasks.iter_mut().find(|node| node.id == id)
    }
}

/// Click-to-connect state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectState {
    #[default]
    Inactive,
    Idle,
    Pending(String),
}

impl ConnectState {
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectState::Inactive)
    }

    pub fn pending(&self) -> Option<&str> {
        match self {
            ConnectState::Pending(id) => Some(id),
            _ => None,
        }
    }
}

/// Result of picking a node while connecting.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Connection mode is off or the id is unknown.
    Ignored,
    Pending(String),
    /// The pending source was picked again.
    Unchanged,
    Connected(Connection),
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
struct DragSession {
    id: String,
    origin_x: f64,
    origin_y: f64,
}

#[derive(Debug, Default)]
pub struct WorkflowController {
    store: WorkflowStore,
    connect: ConnectState,
    drag: Option<DragSession>,
}

impl WorkflowController {
    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    pub fn connect_state(&self) -> &ConnectState {
        &self.connect
    }

    pub fn dragging(&self) -> Option<&str> {
        self.drag.as_ref().map(|session| session.id.as_str())
    }

    pub(crate) fn replace(&mut self, doc: WorkflowDocument) {
        self.store = WorkflowStore::new(doc);
        if let ConnectState::Pending(id) = &self.connect {
            if self.store.node(id).is_none() {
                self.connect = ConnectState::Idle;
            }
        }
        if let Some(session) = &self.drag {
            if self.store.node(&session.id).is_none() {
                self.drag = None;
            }
        }
    }

    pub fn create(
        &mut self,
        ctx: &mut AppContext,
        draft: WorkflowDraft,
    ) -> Result<WorkflowTask, BoardError> {
        let title = normalize_text(&draft.title).ok_or(ValidationError::EmptyWorkflowTitle)?;
        let (x, y) = ctx.random_position();
        let node = WorkflowTask {
            id: ctx.next_id().to_string(),
            title,
            emoji: draft.emoji.as_deref().and_then(normalize_text),
            description: draft.description.as_deref().and_then(normalize_text),
            x,
            y,
        };
        self.store.doc.tasks.push(node.clone());
        info!(event = "workflow_task_created", id = %node.id, x, y);
        self.save(ctx)?;
        Ok(node)
    }

    pub fn update(
        &mut self,
        ctx: &mut AppContext,
        id: &str,
        patch: WorkflowPatch,
    ) -> Result<Option<WorkflowTask>, BoardError> {
        let title = match patch.title.as_deref() {
            Some(title) => Some(normalize_text(title).ok_or(ValidationError::EmptyWorkflowTitle)?),
            None => None,
        };
        let Some(node) = self.store.node_mut(id) else {
            return Ok(None);
        };
        if let Some(title) = title {
            node.title = title;
        }
        if let Some(emoji) = patch.emoji.as_deref() {
            node.emoji = normalize_text(emoji);
        }
        if let Some(description) = patch.description.as_deref() {
            node.description = normalize_text(description);
        }
        let node = node.clone();
        info!(event = "workflow_task_updated", id = %node.id);
        self.save(ctx)?;
        Ok(Some(node))
    }

    /// Removes a node together with every edge touching it.
    pub fn delete(
        &mut self,
        ctx: &mut AppContext,
        id: &str,
        confirm: &mut dyn Confirm,
    ) -> Result<Removal, BoardError> {
        if self.store.node(id).is_none() {
            return Ok(Removal::NotFound);
        }
        if !confirm.confirm("Delete this workflow task?") {
            return Ok(Removal::Declined);
        }
        self.store.doc.tasks.retain(|node| node.id != id);
        let before = self.store.doc.connections.len();
        self.store.doc.connections.retain(|edge| !edge.touches(id));
        let dropped = before - self.store.doc.connections.len();
        if self.connect.pending() == Some(id) {
            self.connect = ConnectState::Idle;
        }
        if self.dragging() == Some(id) {
            self.drag = None;
        }
        info!(event = "workflow_task_deleted", id, dropped_connections = dropped);
        self.save(ctx)?;
        Ok(Removal::Removed)
    }

    /// Moves a node without persisting. Coordinates are floored at zero;
    /// non-finite ones leave the node where it is.
    pub fn reposition(&mut self, id: &str, x: f64, y: f64) -> Option<(f64, f64)> {
        let node = self.store.node_mut(id)?;
        if !x.is_finite() || !y.is_finite() {
            debug!(event = "reposition_ignored", id, x, y);
            return Some((node.x, node.y));
        }
        node.x = x.max(0.0);
        node.y = y.max(0.0);
        Some((node.x, node.y))
    }

    pub fn place(
        &mut self,
        ctx: &mut AppContext,
        id: &str,
        x: f64,
        y: f64,
    ) -> Result<Option<(f64, f64)>, BoardError> {
        let finite = x.is_finite() && y.is_finite();
        let Some(position) = self.reposition(id, x, y) else {
            return Ok(None);
        };
        if !finite {
            return Ok(Some(position));
        }
        self.save(ctx)?;
        Ok(Some(position))
    }

    /// Starts a drag gesture. Refused while connecting or for unknown ids.
    pub fn begin_drag(&mut self, id: &str) -> bool {
        if self.connect.is_active() {
            debug!(event = "drag_refused", id, reason = "connection_mode");
            return false;
        }
        let Some(node) = self.store.node(id) else {
            return false;
        };
        self.drag = Some(DragSession {
            id: node.id.clone(),
            origin_x: node.x,
            origin_y: node.y,
        });
        true
    }

    /// Offsets the dragged node from where the gesture began.
    pub fn drag_by(&mut self, dx: f64, dy: f64) -> Option<(String, f64, f64)> {
        let session = self.drag.clone()?;
        let (x, y) = self.reposition(
            &session.id,
            session.origin_x + dx,
            session.origin_y + dy,
        )?;
        Some((session.id, x, y))
    }

    /// Ends the gesture and persists the final position once.
    pub fn end_drag(&mut self, ctx: &mut AppContext) -> Result<bool, BoardError> {
        let Some(session) = self.drag.take() else {
            return Ok(false);
        };
        if let Some(node) = self.store.node(&session.id) {
            info!(event = "workflow_task_moved", id = %node.id, x = node.x, y = node.y);
        }
        self.save(ctx)?;
        Ok(true)
    }

    pub fn enter_connection_mode(&mut self) {
        self.connect = ConnectState::Idle;
    }

    pub fn exit_connection_mode(&mut self) {
        self.connect = ConnectState::Inactive;
    }

    /// Flips connection mode and returns whether it is now on.
    pub fn toggle_connection_mode(&mut self) -> bool {
        if self.connect.is_active() {
            self.exit_connection_mode();
            false
        } else {
            self.enter_connection_mode();
            true
        }
    }

    pub fn select_for_connection(
        &mut self,
        ctx: &mut AppContext,
        id: &str,
    ) -> Result<Selection, BoardError> {
        if self.store.node(id).is_none() {
            return Ok(Selection::Ignored);
        }
        let source = match &self.connect {
            ConnectState::Inactive => return Ok(Selection::Ignored),
            ConnectState::Idle => {
                self.connect = ConnectState::Pending(id.to_string());
                return Ok(Selection::Pending(id.to_string()));
            }
            ConnectState::Pending(source) if source == id => return Ok(Selection::Unchanged),
            ConnectState::Pending(source) => source.clone(),
        };

        self.connect = ConnectState::Idle;
        if self.store.has_connection(&source, id) {
            return Ok(Selection::Duplicate);
        }
        let edge = Connection::new(source, id);
        self.store.doc.connections.push(edge.clone());
        info!(event = "connection_created", from = %edge.from, to = %edge.to);
        self.save(ctx)?;
        Ok(Selection::Connected(edge))
    }

    pub fn clear_connections(
        &mut self,
        ctx: &mut AppContext,
        confirm: &mut dyn Confirm,
    ) -> Result<Removal, BoardError> {
        if !confirm.confirm("Clear all connections?") {
            return Ok(Removal::Declined);
        }
        let cleared = self.store.doc.connections.len();
        self.store.doc.connections.clear();
        info!(event = "connections_cleared", cleared);
        self.save(ctx)?;
        Ok(Removal::Removed)
    }

    /// Sends the whole document and adopts the version the backend assigned.
    fn save(&mut self, ctx: &mut AppContext) -> Result<(), BoardError> {
        if let Some(Persisted::Workflow { version }) = ctx.persist(Change::Workflow(&self.store.doc))? {
            self.store.doc.version = version;
        }
        Ok(())
    }
}
