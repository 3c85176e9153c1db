use crate::error::StorageError;
use crate::{BoardSnapshot, Task, TaskId, TaskPatch, WorkflowDocument};

/// One mutation as handed to a storage adapter.
///
/// Each variant carries both the entity that changed and the full collection
/// it lives in: remote adapters send the former, key-value adapters rewrite
/// the latter.
#[derive(Debug, Clone, Copy)]
pub enum Change<'a> {
    TaskCreated {
        task: &'a Task,
        tasks: &'a [Task],
    },
    TaskUpdated {
        task: &'a Task,
        patch: &'a TaskPatch,
        tasks: &'a [Task],
    },
    TaskDeleted {
        id: &'a TaskId,
        tasks: &'a [Task],
    },
    GroupCreated {
        name: &'a str,
        groups: &'a [String],
    },
    GroupDeleted {
        name: &'a str,
        groups: &'a [String],
        tasks: &'a [Task],
    },
    Workflow(&'a WorkflowDocument),
}

impl Change<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Change::TaskCreated { .. } => "task_created",
            Change::TaskUpdated { .. } => "task_updated",
            Change::TaskDeleted { .. } => "task_deleted",
            Change::GroupCreated { .. } => "group_created",
            Change::GroupDeleted { .. } => "group_deleted",
            Change::Workflow(_) => "workflow",
        }
    }
}

/// What the adapter reports back after a successful write.
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    Stored,
    /// The backend's copy of a task, e.g. with a database-assigned id.
    Task(Task),
    /// Version stamp the backend gave the workflow document.
    Workflow { version: u64 },
}

pub trait BoardStorage {
    fn load_all(&mut self) -> Result<BoardSnapshot, StorageError>;

    fn save_all(&mut self, snapshot: &BoardSnapshot) -> Result<(), StorageError>;

    fn persist(&mut self, change: Change<'_>) -> Result<Persisted, StorageError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Transport,
    Unauthorized,
    Conflict,
}

/// Adapter that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    snapshot: BoardSnapshot,
    failure: Option<InjectedFailure>,
    writes: Vec<&'static str>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: BoardSnapshot) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    /// Makes every following load and write fail the given way.
    pub fn fail_with(&mut self, failure: Option<InjectedFailure>) {
        self.failure = failure;
    }

    pub fn snapshot(&self) -> &BoardSnapshot {
        &self.snapshot
    }

    /// Kinds of the changes persisted so far, oldest first.
    pub fn writes(&self) -> &[&'static str] {
        &self.writes
    }

    fn check(&self) -> Result<(), StorageError> {
        match self.failure {
            None => Ok(()),
            Some(InjectedFailure::Transport) => {
                Err(StorageError::Transport("injected failure".to_string()))
            }
            Some(InjectedFailure::Unauthorized) => Err(StorageError::Unauthorized),
            Some(InjectedFailure::Conflict) => {
                Err(StorageError::Conflict("injected conflict".to_string()))
            }
        }
    }
}

impl BoardStorage for MemoryStorage {
    fn load_all(&mut self) -> Result<BoardSnapshot, StorageError> {
        self.check()?;
        Ok(self.snapshot.clone())
    }

    fn save_all(&mut self, snapshot: &BoardSnapshot) -> Result<(), StorageError> {
        self.check()?;
        self.snapshot = snapshot.clone();
        self.writes.push("save_all");
        Ok(())
    }

    fn persist(&mut self, change: Change<'_>) -> Result<Persisted, StorageError> {
        self.check()?;
        self.writes.push(change.kind());
        match change {
            Change::TaskCreated { tasks, .. }
            | Change::TaskUpdated { tasks, .. }
            | Change::TaskDeleted { tasks, .. } => self.snapshot.tasks = tasks.to_vec(),
            Change::GroupCreated { groups, .. } => self.snapshot.groups = groups.to_vec(),
            Change::GroupDeleted { groups, tasks, .. } => {
                self.snapshot.groups = groups.to_vec();
                self.snapshot.tasks = tasks.to_vec();
            }
            Change::Workflow(document) => self.snapshot.workflow = document.clone(),
        }
        Ok(Persisted::Stored)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
