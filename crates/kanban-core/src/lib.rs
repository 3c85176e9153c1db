use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod app;
pub mod board;
pub mod command;
pub mod error;
pub mod storage;
pub mod view;
pub mod workflow;

pub use app::{App, AppContext};
pub use board::{BoardController, StatusCounts, TaskStore};
pub use command::{Command, Confirm, Outcome, Removal};
pub use error::{BoardError, StorageError, ValidationError};
pub use storage::{BoardStorage, Change, InjectedFailure, MemoryStorage, Persisted};
pub use workflow::{ConnectState, Selection, WorkflowController, WorkflowStore};

/// Glyph used when a task is saved without one.
pub const DEFAULT_EMOJI: &str = "📝";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of ids minted from millisecond timestamps or database rows.
    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_id(deserializer).map(TaskId)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

impl TaskStatus {
    /// Column order on the board.
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not-started",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Done => "done",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "Not started",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Done => "Done",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "○",
            TaskStatus::InProgress => "◐",
            TaskStatus::Done => "●",
        }
    }

    /// The two statuses a card can jump to, in column order.
    pub fn quick_moves(self) -> [TaskStatus; 2] {
        match self {
            TaskStatus::NotStarted => [TaskStatus::InProgress, TaskStatus::Done],
            TaskStatus::InProgress => [TaskStatus::NotStarted, TaskStatus::Done],
            TaskStatus::Done => [TaskStatus::NotStarted, TaskStatus::InProgress],
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "not-started" | "not_started" | "notstarted" | "todo" => Ok(TaskStatus::NotStarted),
            "in-progress" | "in_progress" | "inprogress" | "doing" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(alias = "_id")]
    pub id: TaskId,
    pub text: String,
    #[serde(default = "default_emoji")]
    pub emoji: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// Fields for a task that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub group: Option<String>,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            text: text.into(),
            status,
            ..Self::default()
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Partial task update. `group: Some(None)` clears the group, `None` leaves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub group: Option<Option<String>>,
    /// Version the writer last saw; the server rejects the write when it moved on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.emoji.is_none() && self.status.is_none() && self.group.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: String,
    pub title: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_blank_as_none"
    )]
    pub emoji: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_blank_as_none"
    )]
    pub description: Option<String>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDraft {
    pub title: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl WorkflowDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Workflow node edit. A blank emoji or description clears that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.from == id || self.to == id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub tasks: Vec<WorkflowTask>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub version: u64,
}

/// Everything a storage adapter loads or saves in one go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub tasks: Vec<Task>,
    pub groups: Vec<String>,
    pub workflow: WorkflowDocument,
}

pub fn default_emoji() -> String {
    DEFAULT_EMOJI.to_string()
}

/// Trimmed text, or `None` when nothing but whitespace is left.
pub fn normalize_text(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_emoji(input: Option<&str>) -> String {
    input.and_then(normalize_text).unwrap_or_else(default_emoji)
}

/// Deserialize an ID that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = serde_json::Value::deserialize(deserializer)?;
    match val {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

fn deserialize_blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|text| normalize_text(&text)))
}

/// Keeps an explicit `null` apart from a missing field.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_moves_exclude_current_status_in_column_order() {
        assert_eq!(
            TaskStatus::NotStarted.quick_moves(),
            [TaskStatus::InProgress, TaskStatus::Done]
        );
        assert_eq!(
            TaskStatus::InProgress.quick_moves(),
            [TaskStatus::NotStarted, TaskStatus::Done]
        );
        assert_eq!(
            TaskStatus::Done.quick_moves(),
            [TaskStatus::NotStarted, TaskStatus::InProgress]
        );
    }

    #[test]
    fn task_accepts_numeric_and_mongo_style_ids() {
        let local: Task = serde_json::from_value(serde_json::json!({
            "id": 1708995600000u64,
            "text": "Ship docs",
            "emoji": "📦",
            "status": "in-progress",
            "createdAt": "2024-02-27T01:00:00Z"
        }))
        .expect("local task");
        assert_eq!(local.id.as_str(), "1708995600000");
        assert_eq!(local.status, TaskStatus::InProgress);
        assert_eq!(local.group, None);

        let remote: Task = serde_json::from_value(serde_json::json!({
            "_id": "65dd0f",
            "text": "Review",
            "status": "done",
            "group": "Docs"
        }))
        .expect("remote task");
        assert_eq!(remote.id.as_str(), "65dd0f");
        assert_eq!(remote.emoji, DEFAULT_EMOJI);
        assert_eq!(remote.group.as_deref(), Some("Docs"));
    }

    #[test]
    fn patch_distinguishes_null_group_from_missing_group() {
        let cleared: TaskPatch =
            serde_json::from_value(serde_json::json!({ "group": null })).expect("cleared");
        assert_eq!(cleared.group, Some(None));

        let untouched: TaskPatch =
            serde_json::from_value(serde_json::json!({ "status": "done" })).expect("untouched");
        assert_eq!(untouched.group, None);
        assert_eq!(untouched.status, Some(TaskStatus::Done));

        let encoded = serde_json::to_value(&cleared).expect("encode");
        assert_eq!(encoded, serde_json::json!({ "group": null }));
    }

    #[test]
    fn workflow_task_treats_blank_optional_fields_as_absent() {
        let task: WorkflowTask = serde_json::from_value(serde_json::json!({
            "id": "1",
            "title": "Plan",
            "emoji": "",
            "description": "  ",
            "x": 120.5,
            "y": 180.0
        }))
        .expect("workflow task");
        assert_eq!(task.emoji, None);
        assert_eq!(task.description, None);
    }

    #[test]
    fn status_parses_loose_spellings() {
        assert_eq!("In_Progress".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert_eq!("not-started".parse::<TaskStatus>(), Ok(TaskStatus::NotStarted));
        assert!("blocked".parse::<TaskStatus>().is_err());
    }
}
