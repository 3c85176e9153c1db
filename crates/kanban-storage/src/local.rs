use fs2::FileExt;
use kanban_core::{
    BoardSnapshot, BoardStorage, Change, Connection, Persisted, StorageError, Task,
    WorkflowDocument, WorkflowTask,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TASKS_KEY: &str = "kanban-tasks";
pub const GROUPS_KEY: &str = "kanban-groups";
pub const WORKFLOW_TASKS_KEY: &str = "workflowTasks";
pub const WORKFLOW_CONNECTIONS_KEY: &str = "workflowConnections";
pub const WORKFLOW_VERSION_KEY: &str = "workflowVersion";

const STORE_FILE: &str = "board.json";
const LOCK_FILE: &str = "board.lock";

/// Key-value store kept in one JSON object on disk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl LocalStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(STORE_FILE),
            lock_path: data_dir.join(LOCK_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(entries) => Ok(entries),
            _ => Err(StorageError::Serialization(format!(
                "{} is not a JSON object",
                self.path.display()
            ))),
        }
    }

    /// Rewrites the touched keys in one atomic replace while holding the
    /// store lock.
    fn write_entries(&self, updates: Vec<(&'static str, Value)>) -> Result<(), StorageError> {
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        lock.lock_exclusive()?;

        let result = self.read_entries().and_then(|mut entries| {
            let keys: Vec<&str> = updates.iter().map(|(key, _)| *key).collect();
            for (key, value) in updates {
                entries.insert(key.to_string(), value);
            }
            let payload = serde_json::to_string_pretty(&Value::Object(entries))?;
            write_atomic(&self.path, &payload)?;
            debug!(event = "local_store_written", path = %self.path.display(), keys = ?keys);
            Ok(())
        });

        let _ = lock.unlock();
        result
    }
}

impl BoardStorage for LocalStore {
    fn load_all(&mut self) -> Result<BoardSnapshot, StorageError> {
        let entries = self.read_entries()?;
        Ok(BoardSnapshot {
            tasks: entry::<Vec<Task>>(&entries, TASKS_KEY)?,
            groups: entry::<Vec<String>>(&entries, GROUPS_KEY)?,
            workflow: WorkflowDocument {
                tasks: entry::<Vec<WorkflowTask>>(&entries, WORKFLOW_TASKS_KEY)?,
                connections: entry::<Vec<Connection>>(&entries, WORKFLOW_CONNECTIONS_KEY)?,
                version: entry::<u64>(&entries, WORKFLOW_VERSION_KEY)?,
            },
        })
    }

    fn save_all(&mut self, snapshot: &BoardSnapshot) -> Result<(), StorageError> {
        let mut updates = vec![
            (TASKS_KEY, serde_json::to_value(&snapshot.tasks)?),
            (GROUPS_KEY, serde_json::to_value(&snapshot.groups)?),
        ];
        updates.extend(workflow_entries(&snapshot.workflow)?);
        self.write_entries(updates)
    }

    fn persist(&mut self, change: Change<'_>) -> Result<Persisted, StorageError> {
        let updates = match change {
            Change::TaskCreated { tasks, .. }
            | Change::TaskUpdated { tasks, .. }
            | Change::TaskDeleted { tasks, .. } => {
                vec![(TASKS_KEY, serde_json::to_value(tasks)?)]
            }
            Change::GroupCreated { groups, .. } => {
                vec![(GROUPS_KEY, serde_json::to_value(groups)?)]
            }
            Change::GroupDeleted { groups, tasks, .. } => vec![
                (GROUPS_KEY, serde_json::to_value(groups)?),
                (TASKS_KEY, serde_json::to_value(tasks)?),
            ],
            Change::Workflow(document) => workflow_entries(document)?,
        };
        self.write_entries(updates)?;
        Ok(Persisted::Stored)
    }

    fn describe(&self) -> String {
        format!("local:{}", self.path.display())
    }
}

fn workflow_entries(
    document: &WorkflowDocument,
) -> Result<Vec<(&'static str, Value)>, StorageError> {
    Ok(vec![
        (WORKFLOW_TASKS_KEY, serde_json::to_value(&document.tasks)?),
        (
            WORKFLOW_CONNECTIONS_KEY,
            serde_json::to_value(&document.connections)?,
        ),
        (WORKFLOW_VERSION_KEY, Value::from(document.version)),
    ])
}

/// Missing or null keys read as the type's default.
fn entry<T: DeserializeOwned + Default>(
    entries: &Map<String, Value>,
    key: &str,
) -> Result<T, StorageError> {
    match entries.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| StorageError::Serialization(format!("{key}: {err}"))),
    }
}

fn write_atomic(path: &Path, payload: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };

    fs::write(&temp_path, payload)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
