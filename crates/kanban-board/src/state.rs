use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use kanban_core::view::{board_view, BoardView, CardView, NodeBox};
use kanban_core::{
    normalize_text, App as Board, Command, Confirm, Outcome, Removal, Selection, TaskDraft, TaskId,
    TaskPatch, TaskStatus, WorkflowDraft, WorkflowPatch, WorkflowTask,
};
use ratatui::layout::Rect;
use tracing::{debug, warn};

/// Node size on the canvas, in canvas units.
pub const NODE_WIDTH: f64 = 160.0;
pub const NODE_HEIGHT: f64 = 60.0;
const NUDGE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Board,
    Workflow,
}

impl View {
    pub fn label(self) -> &'static str {
        match self {
            View::Board => "Board",
            View::Workflow => "Workflow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPurpose {
    AddTask(TaskStatus),
    EditTask(TaskId),
    SetGroup(TaskId),
    AddGroup,
    DeleteGroup,
    AddNode,
    EditNode(String),
}

impl InputPurpose {
    pub fn label(&self) -> &'static str {
        match self {
            InputPurpose::AddTask(_) => "New task",
            InputPurpose::EditTask(_) => "Task text",
            InputPurpose::SetGroup(_) => "Group (empty for none)",
            InputPurpose::AddGroup => "New group",
            InputPurpose::DeleteGroup => "Delete group",
            InputPurpose::AddNode => "New workflow task",
            InputPurpose::EditNode(_) => "Workflow task title",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputForm {
    pub purpose: InputPurpose,
    pub buffer: String,
}

/// A destructive command waiting for a yes/no answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirm {
    pub prompt: String,
    command: Command,
}

/// Where the canvas was last drawn, for mapping mouse cells back to canvas
/// units. Canvas y points down, like the stored node positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    pub area: Rect,
    pub width: f64,
    pub height: f64,
}

impl CanvasGeometry {
    pub fn to_canvas(&self, column: u16, row: u16) -> Option<(f64, f64)> {
        if !contains(self.area, column, row) {
            return None;
        }
        let fx = (f64::from(column - self.area.x) + 0.5) / f64::from(self.area.width);
        let fy = (f64::from(row - self.area.y) + 0.5) / f64::from(self.area.height);
        Some((fx * self.width, fy * self.height))
    }

    /// Canvas units covered by one terminal cell.
    pub fn cell_size(&self) -> (f64, f64) {
        (
            self.width / f64::from(self.area.width.max(1)),
            self.height / f64::from(self.area.height.max(1)),
        )
    }
}

pub fn node_box(node: &WorkflowTask) -> NodeBox {
    NodeBox {
        x: node.x,
        y: node.y,
        width: NODE_WIDTH,
        height: NODE_HEIGHT,
    }
}

/// Records the prompt and declines, so the dialog can ask before the
/// command runs for real.
#[derive(Default)]
struct Deferred {
    prompt: Option<String>,
}

impl Confirm for Deferred {
    fn confirm(&mut self, prompt: &str) -> bool {
        self.prompt = Some(prompt.to_string());
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragInput {
    Keys { dx: f64, dy: f64 },
    Mouse { anchor: (f64, f64) },
}

pub struct App {
    pub board: Board,
    pub backend: String,
    pub view: View,
    pub column: usize,
    pub row: usize,
    pub node: usize,
    pub input: Option<InputForm>,
    pub confirm: Option<PendingConfirm>,
    pub show_help: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Set when the backend rejected our credentials; the session ends.
    pub fatal: Option<String>,
    pub canvas: Option<CanvasGeometry>,
    drag: Option<DragInput>,
    should_quit: bool,
}

impl App {
    pub fn new(board: Board, backend: String) -> Self {
        Self {
            board,
            backend,
            view: View::Board,
            column: 0,
            row: 0,
            node: 0,
            input: None,
            confirm: None,
            show_help: false,
            message: None,
            error: None,
            fatal: None,
            canvas: None,
            drag: None,
            should_quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn reload(&mut self) {
        if self.run(Command::Reload).is_some() {
            self.set_message("Reloaded.");
        }
    }

    /// Another process changed the backing file. Skipped mid-gesture.
    pub fn on_external_change(&mut self) {
        if self.drag.is_some() || self.input.is_some() || self.confirm.is_some() {
            debug!(event = "reload_deferred");
            return;
        }
        let _ = self.run(Command::Reload);
    }

    pub fn board_view(&self) -> BoardView {
        board_view(self.board.board().store())
    }

    pub fn selected_card(&self) -> Option<CardView> {
        let view = self.board_view();
        view.columns
            .get(self.column)
            .and_then(|column| column.cards().nth(self.row).cloned())
    }

    pub fn selected_node(&self) -> Option<&WorkflowTask> {
        self.board.workflow().store().nodes().get(self.node)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.confirm.is_some() {
            let accepted = matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y'));
            self.answer_confirm(accepted);
            return;
        }
        if self.input.is_some() {
            self.handle_input_key(key);
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.drag.is_some() {
            self.handle_drag_key(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.view = match self.view {
                    View::Board => View::Workflow,
                    View::Workflow => View::Board,
                };
                self.clear_status();
            }
            KeyCode::Char('?') => {
                self.show_help = !self.show_help;
            }
            KeyCode::Char('r') => {
                self.reload();
            }
            KeyCode::Esc => {
                if self.show_help {
                    self.show_help = false;
                } else if self.board.workflow().connect_state().is_active() {
                    let _ = self.run(Command::ExitConnectionMode);
                    self.set_message("Connection mode off.");
                } else {
                    self.clear_status();
                }
            }
            _ => match self.view {
                View::Board => self.handle_board_key(key),
                View::Workflow => self.handle_workflow_key(key),
            },
        }
        self.clamp_selection();
    }

    fn handle_board_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Left | KeyCode::Char('h') => {
                self.column = self.column.saturating_sub(1);
                self.row = 0;
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.column = (self.column + 1).min(TaskStatus::ALL.len() - 1);
                self.row = 0;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.row = self.row.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.row += 1;
            }
            KeyCode::Char('a') => {
                let status = TaskStatus::ALL[self.column];
                self.open_input(InputPurpose::AddTask(status), String::new());
            }
            KeyCode::Char('e') => {
                if let Some(card) = self.selected_card() {
                    self.open_input(InputPurpose::EditTask(card.id), card.text);
                }
            }
            KeyCode::Char('g') => {
                if let Some(card) = self.selected_card() {
                    let current = self.task_group(&card.id).unwrap_or_default();
                    self.open_input(InputPurpose::SetGroup(card.id), current);
                }
            }
            KeyCode::Char('n') => {
                self.open_input(InputPurpose::AddGroup, String::new());
            }
            KeyCode::Char('D') => {
                let current = self
                    .selected_card()
                    .and_then(|card| self.task_group(&card.id))
                    .unwrap_or_default();
                self.open_input(InputPurpose::DeleteGroup, current);
            }
            KeyCode::Char('d') => {
                if let Some(card) = self.selected_card() {
                    self.run_and_report(Command::DeleteTask { id: card.id });
                }
            }
            KeyCode::Char(digit @ '1'..='3') => {
                let index = digit as usize - '1' as usize;
                self.move_selected(TaskStatus::ALL[index]);
            }
            KeyCode::Char('m') => {
                if let Some(card) = self.selected_card() {
                    self.move_selected(card.quick_moves[0]);
                }
            }
            KeyCode::Char('M') => {
                if let Some(card) = self.selected_card() {
                    self.move_selected(card.quick_moves[1]);
                }
            }
            _ => {}
        }
    }

    fn handle_workflow_key(&mut self, key: KeyEvent) {
        let connecting = self.board.workflow().connect_state().is_active();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.node = self.node.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.node += 1;
            }
            KeyCode::Char('a') => {
                self.open_input(InputPurpose::AddNode, String::new());
            }
            KeyCode::Char('e') => {
                if let Some(node) = self.selected_node() {
                    let (id, title) = (node.id.clone(), node.title.clone());
                    self.open_input(InputPurpose::EditNode(id), title);
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.selected_node().map(|node| node.id.clone()) {
                    self.run_and_report(Command::DeleteNode { id });
                }
            }
            KeyCode::Char('c') => {
                self.run_and_report(Command::ToggleConnectionMode);
            }
            KeyCode::Char('x') => {
                self.run_and_report(Command::ClearConnections);
            }
            KeyCode::Enter | KeyCode::Char(' ') if connecting => {
                if let Some(id) = self.selected_node().map(|node| node.id.clone()) {
                    self.run_and_report(Command::SelectForConnection { id });
                }
            }
            KeyCode::Char('m') => {
                if let Some(id) = self.selected_node().map(|node| node.id.clone()) {
                    if matches!(
                        self.run(Command::BeginDrag { id }),
                        Some(Outcome::Dragging(_))
                    ) {
                        self.drag = Some(DragInput::Keys { dx: 0.0, dy: 0.0 });
                        self.set_message("Moving: arrows to nudge, Enter to drop.");
                    } else if connecting {
                        self.set_message("Leave connection mode to move tasks.");
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_drag_key(&mut self, key: KeyEvent) {
        let Some(DragInput::Keys { dx, dy }) = self.drag else {
            return;
        };
        let (dx, dy) = match key.code {
            KeyCode::Left | KeyCode::Char('h') => (dx - NUDGE, dy),
            KeyCode::Right | KeyCode::Char('l') => (dx + NUDGE, dy),
            KeyCode::Up | KeyCode::Char('k') => (dx, dy - NUDGE),
            KeyCode::Down | KeyCode::Char('j') => (dx, dy + NUDGE),
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char('m') | KeyCode::Char(' ') => {
                self.finish_drag();
                return;
            }
            _ => return,
        };
        self.drag = Some(DragInput::Keys { dx, dy });
        let _ = self.run(Command::DragBy { dx, dy });
    }

    fn finish_drag(&mut self) {
        self.drag = None;
        if let Some(outcome) = self.run(Command::EndDrag) {
            if outcome == Outcome::Saved {
                self.set_message("Position saved.");
            }
        }
    }

    pub fn handle_mouse(&mut self, event: MouseEvent) {
        if self.view != View::Workflow || self.input.is_some() || self.confirm.is_some() {
            return;
        }
        let Some(geometry) = self.canvas else {
            return;
        };
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let Some(point) = geometry.to_canvas(event.column, event.row) else {
                    return;
                };
                let Some(index) = self.node_at(point) else {
                    return;
                };
                self.node = index;
                let Some(id) = self.selected_node().map(|node| node.id.clone()) else {
                    return;
                };
                if self.board.workflow().connect_state().is_active() {
                    self.run_and_report(Command::SelectForConnection { id });
                } else if matches!(
                    self.run(Command::BeginDrag { id }),
                    Some(Outcome::Dragging(_))
                ) {
                    self.drag = Some(DragInput::Mouse { anchor: point });
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let Some(DragInput::Mouse { anchor }) = self.drag else {
                    return;
                };
                let Some((x, y)) = geometry.to_canvas(event.column, event.row) else {
                    return;
                };
                let _ = self.run(Command::DragBy {
                    dx: x - anchor.0,
                    dy: y - anchor.1,
                });
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if matches!(self.drag, Some(DragInput::Mouse { .. })) {
                    self.finish_drag();
                }
            }
            _ => {}
        }
    }

    /// Topmost node under a canvas point; later nodes draw on top.
    fn node_at(&self, (x, y): (f64, f64)) -> Option<usize> {
        self.board
            .workflow()
            .store()
            .nodes()
            .iter()
            .rposition(|node| {
                x >= node.x && x <= node.x + NODE_WIDTH && y >= node.y && y <= node.y + NODE_HEIGHT
            })
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        let Some(form) = self.input.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.input = None;
            }
            KeyCode::Enter => {
                if let Some(form) = self.input.take() {
                    self.submit_input(form);
                }
            }
            KeyCode::Backspace => {
                form.buffer.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                form.buffer.push(c);
            }
            _ => {}
        }
    }

    fn open_input(&mut self, purpose: InputPurpose, buffer: String) {
        self.clear_status();
        self.input = Some(InputForm { purpose, buffer });
    }

    fn submit_input(&mut self, form: InputForm) {
        let InputForm { purpose, buffer } = form;
        let command = match purpose {
            InputPurpose::AddTask(status) => Command::CreateTask(TaskDraft::new(buffer, status)),
            InputPurpose::EditTask(id) => Command::UpdateTask {
                id,
                patch: TaskPatch {
                    text: Some(buffer),
                    ..TaskPatch::default()
                },
            },
            InputPurpose::SetGroup(id) => Command::UpdateTask {
                id,
                patch: TaskPatch {
                    group: Some(normalize_text(&buffer)),
                    ..TaskPatch::default()
                },
            },
            InputPurpose::AddGroup => Command::CreateGroup { name: buffer },
            InputPurpose::DeleteGroup => Command::DeleteGroup { name: buffer },
            InputPurpose::AddNode => Command::CreateNode(WorkflowDraft::new(buffer)),
            InputPurpose::EditNode(id) => Command::UpdateNode {
                id,
                patch: WorkflowPatch {
                    title: Some(buffer),
                    ..WorkflowPatch::default()
                },
            },
        };
        self.run_and_report(command);
    }

    fn answer_confirm(&mut self, accepted: bool) {
        let Some(pending) = self.confirm.take() else {
            return;
        };
        if !accepted {
            self.set_message("Cancelled.");
            return;
        }
        let mut accept = |_: &str| true;
        match self.board.dispatch(pending.command, &mut accept) {
            Ok(outcome) => self.report(outcome),
            Err(err) => self.fail(err),
        }
        self.clamp_selection();
    }

    fn move_selected(&mut self, status: TaskStatus) {
        if let Some(card) = self.selected_card() {
            self.run_and_report(Command::MoveTask {
                id: card.id,
                status,
            });
        }
    }

    fn task_group(&self, id: &TaskId) -> Option<String> {
        self.board
            .board()
            .store()
            .get(id)
            .and_then(|task| task.group.clone())
    }

    fn run_and_report(&mut self, command: Command) {
        if let Some(outcome) = self.run(command) {
            self.report(outcome);
        }
        self.clamp_selection();
    }

    /// Dispatches with a deferred confirmation. A destructive command that
    /// asked for one is parked in `confirm` instead of running.
    fn run(&mut self, command: Command) -> Option<Outcome> {
        let parked = command.is_destructive().then(|| command.clone());
        let mut deferred = Deferred::default();
        match self.board.dispatch(command, &mut deferred) {
            Ok(Outcome::Removal(Removal::Declined)) => {
                if let (Some(prompt), Some(command)) = (deferred.prompt, parked) {
                    self.confirm = Some(PendingConfirm { prompt, command });
                }
                None
            }
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    fn fail(&mut self, err: kanban_core::BoardError) {
        if err.is_fatal() {
            warn!(event = "session_ended", error = %err);
            self.fatal = Some(err.to_string());
            self.should_quit = true;
            return;
        }
        self.message = None;
        self.error = Some(err.to_string());
    }

    fn report(&mut self, outcome: Outcome) {
        let message = match outcome {
            Outcome::Task(task) => {
                self.select_task(&task.id);
                format!("{} {} ({})", task.emoji, task.text, task.status.label())
            }
            Outcome::Group(name) => format!("Group '{name}' added."),
            Outcome::Node(node) => {
                if let Some(index) = self
                    .board
                    .workflow()
                    .store()
                    .nodes()
                    .iter()
                    .position(|candidate| candidate.id == node.id)
                {
                    self.node = index;
                }
                format!("Workflow task '{}' saved.", node.title)
            }
            Outcome::Removal(Removal::Removed) => "Removed.".to_string(),
            Outcome::Removal(_) | Outcome::NotFound => "Nothing to do.".to_string(),
            Outcome::ConnectionMode(true) => {
                "Connection mode: pick a source, then a target.".to_string()
            }
            Outcome::ConnectionMode(false) => "Connection mode off.".to_string(),
            Outcome::Selection(Selection::Pending(_)) => "Source picked; now pick a target.".to_string(),
            Outcome::Selection(Selection::Connected(edge)) => {
                format!("Connected {} -> {}.", edge.from, edge.to)
            }
            Outcome::Selection(Selection::Duplicate) => "Already connected.".to_string(),
            Outcome::Selection(_) => "Pick a different task.".to_string(),
            Outcome::Loaded => "Reloaded.".to_string(),
            Outcome::Position { .. }
            | Outcome::Dragging(_)
            | Outcome::Saved
            | Outcome::Unchanged => return,
        };
        self.set_message(message);
    }

    fn select_task(&mut self, id: &TaskId) {
        let view = self.board_view();
        for (column_index, column) in view.columns.iter().enumerate() {
            if let Some(row) = column.cards().position(|card| &card.id == id) {
                self.column = column_index;
                self.row = row;
                return;
            }
        }
    }

    fn clamp_selection(&mut self) {
        let view = self.board_view();
        self.column = self.column.min(view.columns.len().saturating_sub(1));
        let cards = view
            .columns
            .get(self.column)
            .map(|column| column.cards().count())
            .unwrap_or(0);
        self.row = self.row.min(cards.saturating_sub(1));
        let nodes = self.board.workflow().store().nodes().len();
        self.node = self.node.min(nodes.saturating_sub(1));
    }

    fn set_message(&mut self, message: impl Into<String>) {
        self.error = None;
        self.message = Some(message.into());
    }

    fn clear_status(&mut self) {
        self.error = None;
        self.message = None;
    }
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanban_core::{AppContext, InjectedFailure, MemoryStorage};

    fn app() -> App {
        App::new(
            Board::new(AppContext::new(MemoryStorage::new()).with_seed(7)),
            "memory".to_string(),
        )
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
        press(app, KeyCode::Enter);
    }

    #[test]
    fn adding_a_task_selects_it_in_its_column() {
        let mut app = app();
        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Char('a'));
        assert_eq!(
            app.input.as_ref().map(|form| form.purpose.clone()),
            Some(InputPurpose::AddTask(TaskStatus::InProgress))
        );
        type_text(&mut app, "Ship docs");

        let card = app.selected_card().expect("selected card");
        assert_eq!(card.text, "Ship docs");
        assert_eq!(app.column, 1);
        assert!(app.input.is_none());
    }

    #[test]
    fn blank_task_text_is_reported_not_saved() {
        let mut app = app();
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "   ");
        assert!(app.board.board().store().tasks().is_empty());
        assert_eq!(app.error.as_deref(), Some("task text cannot be empty"));
    }

    #[test]
    fn delete_waits_for_the_dialog() {
        let mut app = app();
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Triage");

        press(&mut app, KeyCode::Char('d'));
        assert_eq!(
            app.confirm.as_ref().map(|pending| pending.prompt.as_str()),
            Some("Delete this task?")
        );
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.board.board().store().tasks().len(), 1);
        assert_eq!(app.message.as_deref(), Some("Cancelled."));

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('y'));
        assert!(app.board.board().store().tasks().is_empty());
        assert!(app.confirm.is_none());
    }

    #[test]
    fn quick_move_follows_the_card() {
        let mut app = app();
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Review");
        press(&mut app, KeyCode::Char('M'));

        assert_eq!(app.column, 2);
        let card = app.selected_card().expect("selected card");
        assert_eq!(card.text, "Review");
        assert_eq!(
            app.board.board().store().tasks()[0].status,
            TaskStatus::Done
        );
    }

    #[test]
    fn group_edit_with_blank_input_ungroups() {
        let mut app = app();
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Write intro");
        press(&mut app, KeyCode::Char('g'));
        type_text(&mut app, "Docs");
        assert_eq!(
            app.board.board().store().tasks()[0].group.as_deref(),
            Some("Docs")
        );

        press(&mut app, KeyCode::Char('g'));
        for _ in 0.."Docs".len() {
            press(&mut app, KeyCode::Backspace);
        }
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.board.board().store().tasks()[0].group, None);
        assert_eq!(app.board.board().store().groups(), ["Docs".to_string()]);
    }

    #[test]
    fn connecting_two_workflow_tasks_with_keys() {
        let mut app = app();
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.view, View::Workflow);
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Plan");
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Build");
        assert_eq!(app.node, 1);

        press(&mut app, KeyCode::Char('c'));
        press(&mut app, KeyCode::Char('k'));
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Enter);

        let store = app.board.workflow().store();
        assert_eq!(store.connections().len(), 1);
        assert_eq!(store.connections()[0].from, store.nodes()[0].id);
        assert_eq!(store.connections()[0].to, store.nodes()[1].id);

        press(&mut app, KeyCode::Esc);
        assert!(!app.board.workflow().connect_state().is_active());
    }

    #[test]
    fn keyboard_drag_moves_then_drops() {
        let mut app = app();
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Plan");
        let (x, y) = {
            let node = app.selected_node().expect("node");
            (node.x, node.y)
        };

        press(&mut app, KeyCode::Char('m'));
        assert!(app.is_dragging());
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);

        assert!(!app.is_dragging());
        assert!(app.board.workflow().dragging().is_none());
        let node = app.selected_node().expect("node");
        assert_eq!((node.x, node.y), (x + 20.0, y + 10.0));
        assert_eq!(app.message.as_deref(), Some("Position saved."));
    }

    #[test]
    fn mouse_drag_on_the_canvas_moves_the_node_under_the_pointer() {
        let mut app = app();
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Plan");
        let (x, y) = {
            let node = app.selected_node().expect("node");
            (node.x, node.y)
        };
        // one cell per ten canvas units
        app.canvas = Some(CanvasGeometry {
            area: Rect::new(0, 0, 100, 50),
            width: 1000.0,
            height: 500.0,
        });
        let column = (x / 10.0) as u16 + 2;
        let row = (y / 10.0) as u16 + 2;
        let mouse = |kind, column, row| MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        };

        app.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), column, row));
        assert!(app.is_dragging());
        app.handle_mouse(mouse(
            MouseEventKind::Drag(MouseButton::Left),
            column + 3,
            row + 1,
        ));
        app.handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), column + 3, row + 1));

        assert!(!app.is_dragging());
        let node = app.selected_node().expect("node");
        assert!((node.x - (x + 30.0)).abs() < 1e-9);
        assert!((node.y - (y + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn unauthorized_reload_ends_the_session() {
        let mut storage = MemoryStorage::new();
        storage.fail_with(Some(InjectedFailure::Unauthorized));
        let mut app = App::new(Board::new(AppContext::new(storage)), "remote".to_string());

        press(&mut app, KeyCode::Char('r'));
        assert!(app.should_quit());
        assert_eq!(
            app.fatal.as_deref(),
            Some("authentication failed, sign in again")
        );
    }

    #[test]
    fn canvas_geometry_maps_cells_to_units() {
        let geometry = CanvasGeometry {
            area: Rect::new(10, 5, 80, 20),
            width: 800.0,
            height: 400.0,
        };
        assert_eq!(geometry.to_canvas(10, 5), Some((5.0, 10.0)));
        assert_eq!(geometry.to_canvas(9, 5), None);
        assert_eq!(geometry.cell_size(), (10.0, 20.0));
    }
}
