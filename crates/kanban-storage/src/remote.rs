use kanban_core::{
    BoardSnapshot, BoardStorage, Change, Persisted, StorageError, Task, TaskDraft, TaskPatch,
    WorkflowDocument,
};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: RemoteUser,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Blocking client for the board API. Requests go out one at a time in
/// call order.
pub struct RemoteStorage {
    client: Client,
    base_url: Url,
    token: String,
}

impl RemoteStorage {
    pub fn new(api_url: &str, token: impl Into<String>) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|err| StorageError::Transport(err.to_string()))?;
        let base_url = Url::parse(api_url.trim_end_matches('/'))
            .map_err(|err| StorageError::Transport(format!("invalid API URL {api_url}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::Transport(format!(
                "invalid API URL {api_url}"
            )));
        }

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// The account the token belongs to.
    pub fn current_user(&self) -> Result<RemoteUser, StorageError> {
        let me: MeResponse = self.get(&["auth", "me"])?;
        Ok(me.user)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, StorageError> {
        self.get(&["tasks"])
    }

    pub fn create_task(&self, draft: &TaskDraft) -> Result<Task, StorageError> {
        self.json(self.client.post(self.url(&["tasks"])?).json(draft))
    }

    pub fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, StorageError> {
        self.json(self.client.put(self.url(&["tasks", id])?).json(patch))
    }

    pub fn delete_task(&self, id: &str) -> Result<(), StorageError> {
        self.send(self.client.delete(self.url(&["tasks", id])?))
            .map(|_| ())
    }

    pub fn list_groups(&self) -> Result<Vec<String>, StorageError> {
        self.get(&["groups"])
    }

    /// Registers a group. A name the server already knows is not an error.
    pub fn create_group(&self, name: &str) -> Result<(), StorageError> {
        let request = self
            .client
            .post(self.url(&["groups"])?)
            .json(&serde_json::json!({ "name": name }));
        match self.send(request) {
            Ok(_) | Err(StorageError::Conflict(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn delete_group(&self, name: &str) -> Result<(), StorageError> {
        self.send(self.client.delete(self.url(&["groups", name])?))
            .map(|_| ())
    }

    pub fn workflow(&self) -> Result<WorkflowDocument, StorageError> {
        self.get(&["workflow"])
    }

    pub fn save_workflow(&self, doc: &WorkflowDocument) -> Result<WorkflowDocument, StorageError> {
        self.json(self.client.post(self.url(&["workflow"])?).json(doc))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Transport(format!("invalid API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, StorageError> {
        self.json(self.client.get(self.url(segments)?))
    }

    fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StorageError> {
        let response = self.send(request)?;
        response
            .json()
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .map_err(|err| StorageError::Transport(err.to_string()))?;
        let status = response.status();
        debug!(event = "api_response", url = %response.url(), status = status.as_u16());

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(StorageError::Unauthorized);
        }
        let text = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        if status == StatusCode::CONFLICT {
            return Err(StorageError::Conflict(message));
        }
        Err(StorageError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

impl BoardStorage for RemoteStorage {
    fn load_all(&mut self) -> Result<BoardSnapshot, StorageError> {
        Ok(BoardSnapshot {
            tasks: self.list_tasks()?,
            groups: self.list_groups()?,
            workflow: self.workflow()?,
        })
    }

    /// Pushes a whole board: groups are registered, tasks the server does not
    /// know are created, known ones overwritten, and the workflow replaced.
    fn save_all(&mut self, snapshot: &BoardSnapshot) -> Result<(), StorageError> {
        for group in &snapshot.groups {
            self.create_group(group)?;
        }
        for task in &snapshot.tasks {
            let patch = TaskPatch {
                text: Some(task.text.clone()),
                emoji: Some(task.emoji.clone()),
                status: Some(task.status),
                group: Some(task.group.clone()),
                version: None,
            };
            match self.update_task(task.id.as_str(), &patch) {
                Ok(_) => {}
                Err(StorageError::Status { status: 404, .. }) => {
                    self.create_task(&draft_from(task))?;
                }
                Err(err) => return Err(err),
            }
        }
        let workflow = WorkflowDocument {
            version: 0,
            ..snapshot.workflow.clone()
        };
        self.save_workflow(&workflow)?;
        Ok(())
    }

    fn persist(&mut self, change: Change<'_>) -> Result<Persisted, StorageError> {
        match change {
            Change::TaskCreated { task, .. } => {
                self.create_task(&draft_from(task)).map(Persisted::Task)
            }
            Change::TaskUpdated { task, patch, .. } => self
                .update_task(task.id.as_str(), patch)
                .map(Persisted::Task),
            Change::TaskDeleted { id, .. } => {
                self.delete_task(id.as_str()).map(|_| Persisted::Stored)
            }
            Change::GroupCreated { name, .. } => {
                self.create_group(name).map(|_| Persisted::Stored)
            }
            Change::GroupDeleted { name, .. } => {
                self.delete_group(name).map(|_| Persisted::Stored)
            }
            Change::Workflow(document) => self
                .save_workflow(document)
                .map(|saved| Persisted::Workflow {
                    version: saved.version,
                }),
        }
    }

    fn describe(&self) -> String {
        format!("remote:{}", self.base_url)
    }
}

fn draft_from(task: &Task) -> TaskDraft {
    TaskDraft {
        text: task.text.clone(),
        emoji: Some(task.emoji.clone()),
        status: task.status,
        group: task.group.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_append_escaped_segments() {
        let remote = RemoteStorage::new("http://localhost:5000/api/", "token").expect("client");
        assert_eq!(
            remote.url(&["groups", "Q3 / Docs"]).expect("url").as_str(),
            "http://localhost:5000/api/groups/Q3%20%2F%20Docs"
        );
        assert_eq!(
            remote.url(&["auth", "me"]).expect("url").as_str(),
            "http://localhost:5000/api/auth/me"
        );
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        assert!(matches!(
            RemoteStorage::new("not a url", "token"),
            Err(StorageError::Transport(_))
        ));
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let mut remote = RemoteStorage::new("http://127.0.0.1:9/api", "token").expect("client");
        assert!(matches!(
            remote.load_all(),
            Err(StorageError::Transport(_))
        ));
    }
}
