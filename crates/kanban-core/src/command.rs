use crate::workflow::Selection;
use crate::{
    Task, TaskDraft, TaskId, TaskPatch, TaskStatus, WorkflowDraft, WorkflowPatch, WorkflowTask,
};

/// Yes/no gate in front of destructive commands.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// A user gesture, already decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Reload,
    CreateTask(TaskDraft),
    UpdateTask { id: TaskId, patch: TaskPatch },
    MoveTask { id: TaskId, status: TaskStatus },
    DeleteTask { id: TaskId },
    CreateGroup { name: String },
    DeleteGroup { name: String },
    CreateNode(WorkflowDraft),
    UpdateNode { id: String, patch: WorkflowPatch },
    DeleteNode { id: String },
    /// Live position update while dragging; not persisted.
    Reposition { id: String, x: f64, y: f64 },
    /// Position update that is persisted right away.
    PlaceNode { id: String, x: f64, y: f64 },
    BeginDrag { id: String },
    DragBy { dx: f64, dy: f64 },
    EndDrag,
    EnterConnectionMode,
    ExitConnectionMode,
    ToggleConnectionMode,
    SelectForConnection { id: String },
    ClearConnections,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Reload => "reload",
            Command::CreateTask(_) => "create_task",
            Command::UpdateTask { .. } => "update_task",
            Command::MoveTask { .. } => "move_task",
            Command::DeleteTask { .. } => "delete_task",
            Command::CreateGroup { .. } => "create_group",
            Command::DeleteGroup { .. } => "delete_group",
            Command::CreateNode(_) => "create_node",
            Command::UpdateNode { .. } => "update_node",
            Command::DeleteNode { .. } => "delete_node",
            Command::Reposition { .. } => "reposition",
            Command::PlaceNode { .. } => "place_node",
            Command::BeginDrag { .. } => "begin_drag",
            Command::DragBy { .. } => "drag_by",
            Command::EndDrag => "end_drag",
            Command::EnterConnectionMode => "enter_connection_mode",
            Command::ExitConnectionMode => "exit_connection_mode",
            Command::ToggleConnectionMode => "toggle_connection_mode",
            Command::SelectForConnection { .. } => "select_for_connection",
            Command::ClearConnections => "clear_connections",
        }
    }

    /// Commands that go through the confirmation gate.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Command::DeleteTask { .. }
                | Command::DeleteGroup { .. }
                | Command::DeleteNode { .. }
                | Command::ClearConnections
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    Declined,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Loaded,
    Task(Task),
    Group(String),
    Node(WorkflowTask),
    Position { id: String, x: f64, y: f64 },
    Dragging(String),
    Removal(Removal),
    ConnectionMode(bool),
    Selection(Selection),
    Saved,
    NotFound,
    Unchanged,
}
