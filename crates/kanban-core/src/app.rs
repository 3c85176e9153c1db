use crate::board::BoardController;
use crate::command::{Command, Confirm, Outcome};
use crate::error::{BoardError, StorageError};
use crate::storage::{BoardStorage, Change, Persisted};
use crate::workflow::WorkflowController;
use crate::BoardSnapshot;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Range new workflow nodes are dropped into, on both axes.
pub const SPAWN_RANGE: Range<f64> = 100.0..300.0;

/// Services shared by both controllers: the storage adapter, id minting and
/// randomness. Built once per session.
pub struct AppContext {
    storage: Box<dyn BoardStorage>,
    ids: IdSource,
    rng: StdRng,
}

impl AppContext {
    pub fn new(storage: impl BoardStorage + 'static) -> Self {
        Self::from_boxed(Box::new(storage))
    }

    pub fn from_boxed(storage: Box<dyn BoardStorage>) -> Self {
        Self {
            storage,
            ids: IdSource::default(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn storage(&self) -> &dyn BoardStorage {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> &mut dyn BoardStorage {
        self.storage.as_mut()
    }

    /// Millisecond timestamp, bumped so two ids minted in the same
    /// millisecond still differ.
    pub(crate) fn next_id(&mut self) -> u64 {
        self.ids.next()
    }

    pub(crate) fn random_position(&mut self) -> (f64, f64) {
        (
            self.rng.gen_range(SPAWN_RANGE),
            self.rng.gen_range(SPAWN_RANGE),
        )
    }

    /// Hands a change to the adapter. Write failures are logged and
    /// swallowed (`Ok(None)`) except for auth failures and stale writes.
    pub(crate) fn persist(&mut self, change: Change<'_>) -> Result<Option<Persisted>, BoardError> {
        let kind = change.kind();
        match self.storage.persist(change) {
            Ok(persisted) => {
                debug!(event = "persisted", change = kind);
                Ok(Some(persisted))
            }
            Err(StorageError::Unauthorized) => {
                warn!(event = "persist_unauthorized", change = kind);
                Err(BoardError::Unauthorized)
            }
            Err(StorageError::Conflict(message)) => {
                warn!(event = "persist_conflict", change = kind, error = %message);
                Err(BoardError::StaleWrite(message))
            }
            Err(err) => {
                warn!(
                    event = "persist_failed",
                    change = kind,
                    storage = %self.storage.describe(),
                    error = %err
                );
                Ok(None)
            }
        }
    }

    fn observe_snapshot(&mut self, snapshot: &BoardSnapshot) {
        for task in &snapshot.tasks {
            if let Some(id) = task.id.as_number() {
                self.ids.observe(id);
            }
        }
        for node in &snapshot.workflow.tasks {
            if let Ok(id) = node.id.parse::<u64>() {
                self.ids.observe(id);
            }
        }
    }
}

#[derive(Debug, Default)]
struct IdSource {
    last: u64,
}

impl IdSource {
    fn next(&mut self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let id = now.max(self.last + 1);
        self.last = id;
        id
    }

    fn observe(&mut self, id: u64) {
        self.last = self.last.max(id);
    }
}

/// The board session: one context plus the task and workflow services.
pub struct App {
    ctx: AppContext,
    board: BoardController,
    workflow: WorkflowController,
}

impl App {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            board: BoardController::default(),
            workflow: WorkflowController::default(),
        }
    }

    pub fn board(&self) -> &BoardController {
        &self.board
    }

    pub fn workflow(&self) -> &WorkflowController {
        &self.workflow
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Replaces both stores with what the adapter holds. On failure the
    /// previous state stays in place.
    pub fn load(&mut self) -> Result<(), BoardError> {
        let snapshot = match self.ctx.storage.load_all() {
            Ok(snapshot) => snapshot,
            Err(StorageError::Unauthorized) => return Err(BoardError::Unauthorized),
            Err(err) => {
                warn!(event = "load_failed", storage = %self.ctx.storage.describe(), error = %err);
                return Err(BoardError::Load(err));
            }
        };
        self.ctx.observe_snapshot(&snapshot);
        info!(
            event = "board_loaded",
            storage = %self.ctx.storage.describe(),
            tasks = snapshot.tasks.len(),
            groups = snapshot.groups.len(),
            nodes = snapshot.workflow.tasks.len(),
            connections = snapshot.workflow.connections.len()
        );
        let BoardSnapshot {
            tasks,
            groups,
            workflow,
        } = snapshot;
        self.board.replace(tasks, groups);
        self.workflow.replace(workflow);
        Ok(())
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            tasks: self.board.store().tasks().to_vec(),
            groups: self.board.store().groups().to_vec(),
            workflow: self.workflow.store().document().clone(),
        }
    }

    /// Pushes the whole board, then reloads so server-assigned ids and the
    /// new workflow version are adopted.
    pub fn save_all(&mut self) -> Result<(), BoardError> {
        let snapshot = self.snapshot();
        match self.ctx.storage.save_all(&snapshot) {
            Ok(()) => {}
            Err(StorageError::Unauthorized) => return Err(BoardError::Unauthorized),
            Err(err) => return Err(BoardError::Save(err)),
        }
        self.load()
    }

    pub fn dispatch(
        &mut self,
        command: Command,
        confirm: &mut dyn Confirm,
    ) -> Result<Outcome, BoardError> {
        debug!(event = "dispatch", command = command.name());
        let ctx = &mut self.ctx;
        let outcome = match command {
            Command::Reload => {
                self.load()?;
                Outcome::Loaded
            }
            Command::CreateTask(draft) => Outcome::Task(self.board.create(ctx, draft)?),
            Command::UpdateTask { id, patch } => {
                found_task(self.board.update(ctx, &id, patch)?)
            }
            Command::MoveTask { id, status } => {
                found_task(self.board.move_task(ctx, &id, status)?)
            }
            Command::DeleteTask { id } => Outcome::Removal(self.board.delete(ctx, &id, confirm)?),
            Command::CreateGroup { name } => Outcome::Group(self.board.create_group(ctx, &name)?),
            Command::DeleteGroup { name } => {
                Outcome::Removal(self.board.delete_group(ctx, &name, confirm)?)
            }
            Command::CreateNode(draft) => Outcome::Node(self.workflow.create(ctx, draft)?),
            Command::UpdateNode { id, patch } => match self.workflow.update(ctx, &id, patch)? {
                Some(node) => Outcome::Node(node),
                None => Outcome::NotFound,
            },
            Command::DeleteNode { id } => {
                Outcome::Removal(self.workflow.delete(ctx, &id, confirm)?)
            }
            Command::Reposition { id, x, y } => match self.workflow.reposition(&id, x, y) {
                Some((x, y)) => Outcome::Position { id, x, y },
                None => Outcome::NotFound,
            },
            Command::PlaceNode { id, x, y } => match self.workflow.place(ctx, &id, x, y)? {
                Some((x, y)) => Outcome::Position { id, x, y },
                None => Outcome::NotFound,
            },
            Command::BeginDrag { id } => {
                if self.workflow.begin_drag(&id) {
                    Outcome::Dragging(id)
                } else {
                    Outcome::Unchanged
                }
            }
            Command::DragBy { dx, dy } => match self.workflow.drag_by(dx, dy) {
                Some((id, x, y)) => Outcome::Position { id, x, y },
                None => Outcome::Unchanged,
            },
            Command::EndDrag => {
                if self.workflow.end_drag(ctx)? {
                    Outcome::Saved
                } else {
                    Outcome::Unchanged
                }
            }
            Command::EnterConnectionMode => {
                self.workflow.enter_connection_mode();
                Outcome::ConnectionMode(true)
            }
            Command::ExitConnectionMode => {
                self.workflow.exit_connection_mode();
                Outcome::ConnectionMode(false)
            }
            Command::ToggleConnectionMode => {
                Outcome::ConnectionMode(self.workflow.toggle_connection_mode())
            }
            Command::SelectForConnection { id } => {
                Outcome::Selection(self.workflow.select_for_connection(ctx, &id)?)
            }
            Command::ClearConnections => {
                Outcome::Removal(self.workflow.clear_connections(ctx, confirm)?)
            }
        };
        Ok(outcome)
    }
}

fn found_task(task: Option<crate::Task>) -> Outcome {
    match task {
        Some(task) => Outcome::Task(task),
        None => Outcome::NotFound,
    }
}
