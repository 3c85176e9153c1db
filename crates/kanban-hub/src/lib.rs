use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use kanban_core::{normalize_text, TaskDraft, TaskPatch, WorkflowDocument};
use kanban_storage::{BoardDb, DbError, User};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Shared server state. All database access is serialized behind one lock.
#[derive(Clone)]
pub struct HubState {
    db: Arc<Mutex<BoardDb>>,
}

impl HubState {
    pub fn new(db: BoardDb) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Db(#[from] DbError),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            message: "Authentication required".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Http { status, message } => (status, message),
            ApiError::Db(err @ DbError::Conflict { .. })
            | ApiError::Db(err @ DbError::DuplicateGroup(_))
            | ApiError::Db(err @ DbError::DuplicateUser(_)) => (StatusCode::CONFLICT, err.to_string()),
            ApiError::Db(err) => {
                error!(event = "db_error", error = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// Request body extractor whose rejections use the `{"message"}` error shape.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

pub fn build_router(state: HubState) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "ok" }))
        .route("/api/auth/me", get(me))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/:id", put(update_task).delete(delete_task))
        .route("/api/groups", get(list_groups).post(create_group))
        .route("/api/groups/:name", delete(delete_group))
        .route("/api/workflow", get(get_workflow).post(save_workflow))
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: HubState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn authenticate(state: &HubState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(ApiError::unauthorized)?;

    let db = state.db.lock().await;
    match db.user_by_token(token)? {
        Some(user) => Ok(user),
        None => {
            warn!(event = "auth_rejected");
            Err(ApiError::unauthorized())
        }
    }
}

async fn me(State(state): State<HubState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(serde_json::json!({
        "user": {
            "id": user.id.to_string(),
            "username": user.username,
            "createdAt": user.created_at.to_rfc3339(),
        }
    }))
    .into_response())
}

async fn list_tasks(State(state): State<HubState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let tasks = state.db.lock().await.list_tasks(user.id)?;
    Ok(Json(tasks).into_response())
}

async fn create_task(
    State(state): State<HubState>,
    headers: HeaderMap,
    ApiJson(draft): ApiJson<TaskDraft>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let text =
        normalize_text(&draft.text).ok_or_else(|| ApiError::bad_request("Task text is required"))?;
    let draft = TaskDraft {
        text,
        emoji: draft.emoji,
        status: draft.status,
        group: draft.group.as_deref().and_then(normalize_text),
    };

    let task = state.db.lock().await.insert_task(user.id, &draft)?;
    info!(event = "task_created", user = %user.username, id = %task.id);
    Ok((StatusCode::CREATED, Json(task)).into_response())
}

async fn update_task(
    State(state): State<HubState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<TaskPatch>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let task_id = parse_task_id(&id)?;
    let text = match patch.text.as_deref() {
        Some(text) => Some(
            normalize_text(text).ok_or_else(|| ApiError::bad_request("Task text is required"))?,
        ),
        None => None,
    };
    let patch = TaskPatch {
        text,
        group: patch
            .group
            .map(|group| group.as_deref().and_then(normalize_text)),
        ..patch
    };

    let task = state
        .db
        .lock()
        .await
        .update_task(user.id, task_id, &patch)?
        .ok_or_else(|| ApiError::not_found(format!("Task {id} not found")))?;
    info!(event = "task_updated", user = %user.username, id = %task.id, version = task.version);
    Ok(Json(task).into_response())
}

async fn delete_task(
    State(state): State<HubState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let task_id = parse_task_id(&id)?;
    if !state.db.lock().await.delete_task(user.id, task_id)? {
        return Err(ApiError::not_found(format!("Task {id} not found")));
    }
    info!(event = "task_deleted", user = %user.username, id = %id);
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_groups(
    State(state): State<HubState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let groups = state.db.lock().await.list_groups(user.id)?;
    Ok(Json(groups).into_response())
}

#[derive(Debug, Deserialize)]
struct GroupBody {
    #[serde(default)]
    name: String,
}

async fn create_group(
    State(state): State<HubState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<GroupBody>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let name =
        normalize_text(&body.name).ok_or_else(|| ApiError::bad_request("Group name is required"))?;
    state.db.lock().await.insert_group(user.id, &name)?;
    info!(event = "group_created", user = %user.username, group = %name);
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "name": name }))).into_response())
}

async fn delete_group(
    State(state): State<HubState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    if !state.db.lock().await.delete_group(user.id, &name)? {
        return Err(ApiError::not_found(format!("Group {name} not found")));
    }
    info!(event = "group_deleted", user = %user.username, group = %name);
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn get_workflow(
    State(state): State<HubState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let doc = state.db.lock().await.workflow(user.id)?;
    Ok(Json(doc).into_response())
}

async fn save_workflow(
    State(state): State<HubState>,
    headers: HeaderMap,
    ApiJson(doc): ApiJson<WorkflowDocument>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let saved = state.db.lock().await.save_workflow(user.id, &doc)?;
    info!(
        event = "workflow_saved",
        user = %user.username,
        nodes = saved.tasks.len(),
        connections = saved.connections.len(),
        version = saved.version
    );
    Ok(Json(saved).into_response())
}

fn parse_task_id(id: &str) -> Result<i64, ApiError> {
    id.parse()
        .map_err(|_| ApiError::not_found(format!("Task {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use kanban_core::{Task, TaskStatus};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_with_user() -> (Router, String) {
        let db = BoardDb::open_in_memory().expect("open db");
        let (_, token) = db.create_user("ada").expect("create user");
        (build_router(HubState::new(db)), token)
    }

    fn request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"));
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_is_public() {
        let (app, _) = app_with_user();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_unknown_token_is_unauthorized() {
        let (app, _) = app_with_user();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/tasks")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(request("GET", "/api/auth/me", "wrong", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await["message"],
            "Authentication required"
        );
    }

    #[tokio::test]
    async fn me_reports_the_token_owner() {
        let (app, token) = app_with_user();
        let response = app
            .oneshot(request("GET", "/api/auth/me", &token, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user"]["username"], "ada");
    }

    #[tokio::test]
    async fn task_crud_with_versions() {
        let (app, token) = app_with_user();

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/tasks",
                &token,
                Some(serde_json::json!({ "text": "  ", "status": "done" })),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/tasks",
                &token,
                Some(serde_json::json!({ "text": "Ship docs", "group": "Docs" })),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Task = serde_json::from_value(json_body(response).await).expect("task");
        assert_eq!(created.status, TaskStatus::NotStarted);
        assert_eq!(created.version, 1);

        let uri = format!("/api/tasks/{}", created.id);
        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                &uri,
                &token,
                Some(serde_json::json!({ "status": "in-progress", "version": 1 })),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let updated: Task = serde_json::from_value(json_body(response).await).expect("task");
        assert_eq!(updated.version, 2);

        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                &uri,
                &token,
                Some(serde_json::json!({ "status": "done", "version": 1 })),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(request("GET", "/api/groups", &token, None))
            .await
            .expect("response");
        assert_eq!(json_body(response).await, serde_json::json!(["Docs"]));

        let response = app
            .clone()
            .oneshot(request("DELETE", &uri, &token, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request("DELETE", &uri, &token, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn group_endpoints_validate_and_cascade() {
        let (app, token) = app_with_user();
        let post_group = |name: &str| {
            request(
                "POST",
                "/api/groups",
                &token,
                Some(serde_json::json!({ "name": name })),
            )
        };

        let response = app.clone().oneshot(post_group(" ")).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = app
            .clone()
            .oneshot(post_group("Q3 Docs"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["name"], "Q3 Docs");
        let response = app
            .clone()
            .oneshot(post_group("Q3 Docs"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        app.clone()
            .oneshot(request(
                "POST",
                "/api/tasks",
                &token,
                Some(serde_json::json!({ "text": "member", "group": "Q3 Docs" })),
            ))
            .await
            .expect("response");

        let response = app
            .clone()
            .oneshot(request("DELETE", "/api/groups/Q3%20Docs", &token, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(request("GET", "/api/tasks", &token, None))
            .await
            .expect("response");
        let tasks = json_body(response).await;
        assert_eq!(tasks[0]["group"], Value::Null);

        let response = app
            .oneshot(request("DELETE", "/api/groups/Q3%20Docs", &token, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn workflow_is_created_then_versioned() {
        let (app, token) = app_with_user();
        let response = app
            .clone()
            .oneshot(request("GET", "/api/workflow", &token, None))
            .await
            .expect("response");
        let doc = json_body(response).await;
        assert_eq!(doc["tasks"], serde_json::json!([]));
        assert_eq!(doc["version"], 1);

        let body = serde_json::json!({
            "tasks": [{ "id": "1", "title": "Plan", "x": 120.0, "y": 150.0 }],
            "connections": [],
            "version": 1
        });
        let response = app
            .clone()
            .oneshot(request("POST", "/api/workflow", &token, Some(body.clone())))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["version"], 2);

        let response = app
            .oneshot(request("POST", "/api/workflow", &token, Some(body)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests_with_a_message() {
        let (app, token) = app_with_user();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tasks")
                    .header("authorization", format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["message"].is_string());

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/tasks",
                &token,
                Some(serde_json::json!({ "status": "done" })),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["message"].is_string());

        let response = app
            .oneshot(request(
                "POST",
                "/api/workflow",
                &token,
                Some(serde_json::json!({ "tasks": "nope" })),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["message"].is_string());
    }
}
