use chrono::{DateTime, Utc};
use kanban_core::{Task, TaskDraft, TaskId, TaskPatch, TaskStatus, WorkflowDocument};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

pub const BOARD_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("version {sent} is stale, stored version is {stored}")]
    Conflict { sent: u64, stored: u64 },
    #[error("group '{0}' already exists")]
    DuplicateGroup(String),
    #[error("user '{0}' already exists")]
    DuplicateUser(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// SQLite document store behind the hub. Every query is scoped to one user.
pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn schema_version(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), DbError> {
        let current = self.schema_version()?;
        if current > BOARD_SCHEMA_VERSION {
            return Err(DbError::UnsupportedSchemaVersion {
                found: current,
                supported: BOARD_SCHEMA_VERSION,
            });
        }

        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if current < 1 {
            let sql = include_str!("../migrations/0001_board_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, DbError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table_name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    /// Creates a user and returns it with a fresh bearer token. Only the
    /// token's digest is kept.
    pub fn create_user(&self, username: &str) -> Result<(User, String), DbError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM users WHERE username = ?1",
                [username],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(DbError::DuplicateUser(username.to_string()));
        }

        let token = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO users (username, token_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, token_digest(&token), created_at.to_rfc3339()],
        )?;
        let user = User {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            created_at,
        };
        Ok((user, token))
    }

    pub fn user_by_token(&self, token: &str) -> Result<Option<User>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE token_hash = ?1",
                [token_digest(token)],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;
        row.map(|(id, username, created_at)| {
            Ok(User {
                id,
                username,
                created_at: parse_timestamp(created_at)?,
            })
        })
        .transpose()
    }

    pub fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, text, emoji, status, group_name, created_at, version
            FROM tasks
            WHERE user_id = ?1
            ORDER BY id ASC
            ",
        )?;
        let rows = stmt.query_map([user_id], task_from_row)?;
        let mut tasks = Vec::new();
        for task in rows {
            tasks.push(task?);
        }
        Ok(tasks)
    }

    pub fn task(&self, user_id: i64, task_id: i64) -> Result<Option<Task>, DbError> {
        Ok(self
            .conn
            .query_row(
                "
                SELECT id, text, emoji, status, group_name, created_at, version
                FROM tasks
                WHERE user_id = ?1 AND id = ?2
                ",
                params![user_id, task_id],
                task_from_row,
            )
            .optional()?)
    }

    /// Inserts a task at version 1 and registers its group if needed.
    /// Callers normalize the draft first.
    pub fn insert_task(&self, user_id: i64, draft: &TaskDraft) -> Result<Task, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(group) = draft.group.as_deref() {
            self.ensure_group(user_id, group)?;
        }
        let now = Utc::now().to_rfc3339();
        let emoji = kanban_core::normalize_emoji(draft.emoji.as_deref());
        self.conn.execute(
            "
            INSERT INTO tasks (
                user_id,
                text,
                emoji,
                status,
                group_name,
                version,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
            ",
            params![
                user_id,
                draft.text,
                emoji,
                draft.status.as_str(),
                draft.group,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tx.commit()?;
        self.task(user_id, id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Applies a partial update and bumps the version. A patch carrying a
    /// version other than the stored one is rejected untouched.
    pub fn update_task(
        &self,
        user_id: i64,
        task_id: i64,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, DbError> {
        let Some(mut task) = self.task(user_id, task_id)? else {
            return Ok(None);
        };
        if let Some(sent) = patch.version {
            if sent != task.version {
                return Err(DbError::Conflict {
                    sent,
                    stored: task.version,
                });
            }
        }

        if let Some(text) = patch.text.as_ref() {
            task.text = text.clone();
        }
        if let Some(emoji) = patch.emoji.as_deref() {
            task.emoji = kanban_core::normalize_emoji(Some(emoji));
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(group) = patch.group.as_ref() {
            task.group = group.clone();
        }
        task.version += 1;

        let tx = self.conn.unchecked_transaction()?;
        if let Some(group) = task.group.as_deref() {
            self.ensure_group(user_id, group)?;
        }
        self.conn.execute(
            "
            UPDATE tasks
            SET text = ?3, emoji = ?4, status = ?5, group_name = ?6, version = ?7, updated_at = ?8
            WHERE user_id = ?1 AND id = ?2
            ",
            params![
                user_id,
                task_id,
                task.text,
                task.emoji,
                task.status.as_str(),
                task.group,
                task.version as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(Some(task))
    }

    pub fn delete_task(&self, user_id: i64, task_id: i64) -> Result<bool, DbError> {
        let changes = self.conn.execute(
            "DELETE FROM tasks WHERE user_id = ?1 AND id = ?2",
            params![user_id, task_id],
        )?;
        Ok(changes > 0)
    }

    pub fn list_groups(&self, user_id: i64) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM task_groups WHERE user_id = ?1 ORDER BY position ASC")?;
        let rows = stmt.query_map([user_id], |row| row.get::<_, String>(0))?;
        let mut groups = Vec::new();
        for name in rows {
            groups.push(name?);
        }
        Ok(groups)
    }

    pub fn insert_group(&self, user_id: i64, name: &str) -> Result<(), DbError> {
        if self.has_group(user_id, name)? {
            return Err(DbError::DuplicateGroup(name.to_string()));
        }
        self.append_group(user_id, name)
    }

    /// Drops a group and clears it from every member task. Returns false
    /// when the name was neither registered nor used.
    pub fn delete_group(&self, user_id: i64, name: &str) -> Result<bool, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let registered = self.conn.execute(
            "DELETE FROM task_groups WHERE user_id = ?1 AND name = ?2",
            params![user_id, name],
        )?;
        let cleared = self.conn.execute(
            "UPDATE tasks SET group_name = NULL WHERE user_id = ?1 AND group_name = ?2",
            params![user_id, name],
        )?;
        tx.commit()?;
        Ok(registered > 0 || cleared > 0)
    }

    /// The user's workflow document, created empty on first access.
    pub fn workflow(&self, user_id: i64) -> Result<WorkflowDocument, DbError> {
        if let Some(doc) = self.stored_workflow(user_id)? {
            return Ok(doc);
        }
        let doc = WorkflowDocument {
            version: 1,
            ..WorkflowDocument::default()
        };
        self.write_workflow(user_id, &doc, true)?;
        Ok(doc)
    }

    /// Replaces the whole document. `version == 0` skips the stale check.
    pub fn save_workflow(
        &self,
        user_id: i64,
        doc: &WorkflowDocument,
    ) -> Result<WorkflowDocument, DbError> {
        let stored = self.stored_workflow(user_id)?;
        let stored_version = stored.as_ref().map(|doc| doc.version).unwrap_or(0);
        if doc.version != 0 && stored.is_some() && doc.version != stored_version {
            return Err(DbError::Conflict {
                sent: doc.version,
                stored: stored_version,
            });
        }

        let saved = WorkflowDocument {
            tasks: doc.tasks.clone(),
            connections: doc.connections.clone(),
            version: stored_version + 1,
        };
        self.write_workflow(user_id, &saved, stored.is_none())?;
        Ok(saved)
    }

    fn stored_workflow(&self, user_id: i64) -> Result<Option<WorkflowDocument>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT document_json, version FROM workflows WHERE user_id = ?1",
                [user_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        row.map(|(json, version)| {
            let mut doc: WorkflowDocument = serde_json::from_str(&json)
                .map_err(|err| DbError::Serialization(err.to_string()))?;
            doc.version = version as u64;
            Ok(doc)
        })
        .transpose()
    }

    fn write_workflow(
        &self,
        user_id: i64,
        doc: &WorkflowDocument,
        insert: bool,
    ) -> Result<(), DbError> {
        let document_json =
            serde_json::to_string(doc).map_err(|err| DbError::Serialization(err.to_string()))?;
        let now = Utc::now().to_rfc3339();
        if insert {
            self.conn.execute(
                "
                INSERT INTO workflows (user_id, document_json, version, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                ",
                params![user_id, document_json, doc.version as i64, now],
            )?;
        } else {
            self.conn.execute(
                "
                UPDATE workflows
                SET document_json = ?2, version = ?3, updated_at = ?4
                WHERE user_id = ?1
                ",
                params![user_id, document_json, doc.version as i64, now],
            )?;
        }
        Ok(())
    }

    fn has_group(&self, user_id: i64, name: &str) -> Result<bool, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM task_groups WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn ensure_group(&self, user_id: i64, name: &str) -> Result<(), DbError> {
        if self.has_group(user_id, name)? {
            return Ok(());
        }
        self.append_group(user_id, name)
    }

    fn append_group(&self, user_id: i64, name: &str) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO task_groups (user_id, name, position)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1 FROM task_groups WHERE user_id = ?1))
            ",
            params![user_id, name],
        )?;
        Ok(())
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let status = status.parse::<TaskStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, err.into())
    })?;
    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(err))
        })?
        .with_timezone(&Utc);

    Ok(Task {
        id: TaskId::from(row.get::<_, i64>(0)?.to_string()),
        text: row.get(1)?,
        emoji: row.get(2)?,
        status,
        group: row.get(4)?,
        created_at,
        version: row.get::<_, i64>(6)? as u64,
    })
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| DbError::Timestamp(err.to_string()))
}
