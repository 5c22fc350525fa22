//! `/api/tasks` routes: create, fetch, and list tasks.
//!
//! Creation persists a `pending` record and hands it to the executor; the
//! executor's transitions then reach clients as `task_update` events.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use relay_core::{AgentId, SessionId, Task, TaskId, TaskPriority, TaskStatus, TaskType, UserId};
use relay_tasks::{TaskExecutor, TaskStore};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::ApiError;

/// Default page size for listings.
pub const DEFAULT_PAGE_LIMIT: usize = 20;
/// Largest page size a client may ask for.
pub const MAX_PAGE_LIMIT: usize = 100;

/// State shared by the task routes.
#[derive(Clone)]
pub struct TaskApi {
    store: Arc<dyn TaskStore>,
    executor: TaskExecutor,
}

impl TaskApi {
    /// Routes over `store`, submitting through `executor`.
    pub fn new(store: Arc<dyn TaskStore>, executor: TaskExecutor) -> Self {
        Self { store, executor }
    }

    /// `POST/GET /api/tasks` and `GET /api/tasks/{id}`.
    pub fn routes(self) -> Router {
        Router::new()
            .route("/api/tasks", get(list_tasks).post(create_task))
            .route("/api/tasks/{id}", get(get_task))
            .with_state(self)
    }
}

/// `POST /api/tasks` body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    task_type: Option<String>,
    priority: Option<String>,
    input: Option<Value>,
    user_id: Option<String>,
    agent_id: Option<String>,
    session_id: Option<String>,
}

impl CreateTaskRequest {
    /// Check every field and build the `pending` task, or list what is wrong.
    fn into_task(self) -> Result<Task, Vec<String>> {
        let mut details = Vec::new();

        let title = self.title.map(|t| t.trim().to_owned()).unwrap_or_default();
        if title.is_empty() {
            details.push("title is required".to_owned());
        }

        let task_type = match self.task_type.map(TaskType::from) {
            Some(t) if t.is_known() => Some(t),
            Some(t) => {
                details.push(format!("type must be one of {}, got {t}", known_types()));
                None
            }
            None => {
                details.push("type is required".to_owned());
                None
            }
        };

        let priority = match self.priority.as_deref() {
            None => TaskPriority::default(),
            Some(p) => parse_enum::<TaskPriority>(p).unwrap_or_else(|| {
                details.push(format!("priority must be one of low, medium, high, got {p}"));
                TaskPriority::default()
            }),
        };

        let user_id = self.user_id.filter(|u| !u.trim().is_empty());
        if user_id.is_none() {
            details.push("userId is required".to_owned());
        }

        let (Some(task_type), Some(user_id)) = (task_type, user_id) else {
            return Err(details);
        };
        if !details.is_empty() {
            return Err(details);
        }

        let mut task = Task::pending(
            TaskId::new(),
            task_type,
            UserId::from(user_id),
            self.input.unwrap_or_else(|| json!({})),
        )
        .with_title(title);
        task.description = self.description;
        task.priority = priority;
        if let Some(agent) = self.agent_id {
            task = task.with_agent(AgentId::from(agent));
        }
        if let Some(session) = self.session_id {
            task = task.with_session(SessionId::from(session));
        }
        Ok(task)
    }
}

/// `GET /api/tasks` query string. Numbers arrive as text so bad values get
/// the same `400` body as every other validation failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    user_id: Option<String>,
    status: Option<String>,
    #[serde(rename = "type")]
    task_type: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

/// Page metadata on listings.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
    /// Matching tasks across all pages.
    pub total: usize,
    /// Number of pages.
    pub pages: usize,
}

impl Pagination {
    fn new(page: usize, limit: usize, total: usize) -> Self {
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        }
    }

    fn window(&self) -> std::ops::Range<usize> {
        let start = (self.page - 1).saturating_mul(self.limit).min(self.total);
        start..(start + self.limit).min(self.total)
    }
}

async fn create_task(
    State(api): State<TaskApi>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::invalid(e.body_text()))?;
    let task = request.into_task().map_err(|details| ApiError::Validation {
        error: "Validation failed".into(),
        details,
    })?;

    api.store
        .save(&task)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    api.executor.submit(task.clone()).await?;

    info!(task_id = %task.id, task_type = %task.task_type, user_id = %task.user_id, "task created");
    Ok((StatusCode::CREATED, Json(json!({ "task": task }))))
}

async fn get_task(
    State(api): State<TaskApi>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = TaskId::from(id);
    match api.store.load(&id).await {
        Ok(Some(task)) => Ok(Json(json!({ "task": task }))),
        Ok(None) => Err(ApiError::NotFound(format!("task not found: {id}"))),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

async fn list_tasks(
    State(api): State<TaskApi>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::invalid("userId is required"))?;

    let status = match query.status.as_deref() {
        None => None,
        Some(s) => Some(
            parse_enum::<TaskStatus>(s)
                .ok_or_else(|| ApiError::invalid(format!("unknown status: {s}")))?,
        ),
    };
    let task_type = query.task_type.map(TaskType::from);
    let page = parse_positive(query.page.as_deref(), 1, "page")?;
    let limit = parse_positive(query.limit.as_deref(), DEFAULT_PAGE_LIMIT, "limit")?
        .min(MAX_PAGE_LIMIT);

    let tasks: Vec<Task> = api
        .store
        .list_for_user(&UserId::from(user_id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .into_iter()
        .filter(|t| status.is_none_or(|s| t.status == s))
        .filter(|t| task_type.as_ref().is_none_or(|ty| &t.task_type == ty))
        .collect();

    let pagination = Pagination::new(page, limit, tasks.len());
    let page_items = &tasks[pagination.window()];
    Ok(Json(json!({ "tasks": page_items, "pagination": pagination })))
}

fn parse_enum<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(Value::String(raw.to_owned())).ok()
}

fn parse_positive(raw: Option<&str>, default: usize, field: &str) -> Result<usize, ApiError> {
    match raw {
        None => Ok(default),
        Some(s) => s
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ApiError::invalid(format!("{field} must be a positive integer"))),
    }
}

fn known_types() -> String {
    TaskType::KNOWN
        .iter()
        .map(TaskType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use relay_tasks::{
        ExecutorConfig, HandlerError, HandlerTable, MemoryTaskStore, NoopNotifier, TaskHandler,
    };
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl TaskHandler for Echo {
        async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
            Ok(json!({ "echo": task.input }))
        }
    }

    fn api() -> (TaskApi, Arc<MemoryTaskStore>) {
        let store = Arc::new(MemoryTaskStore::new());
        let executor = TaskExecutor::new(
            HandlerTable::new().with(TaskType::Custom, Echo),
            store.clone(),
            Arc::new(NoopNotifier),
            ExecutorConfig::default(),
        );
        (TaskApi::new(store.clone(), executor), store)
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 64 * 1024)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn post(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/tasks")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_uri(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn create_returns_pending_task() {
        let (api, store) = api();
        let (status, body) = call(
            api.routes(),
            post(&json!({
                "title": "Summarise",
                "type": "custom",
                "userId": "u1",
                "sessionId": "s1",
                "input": {"text": "hi"}
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["task"]["status"], "pending");
        assert_eq!(body["task"]["priority"], "medium");
        assert_eq!(body["task"]["type"], "custom");
        assert_eq!(body["task"]["sessionId"], "s1");
        let id = TaskId::from(body["task"]["id"].as_str().unwrap());
        assert!(store.load(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_reports_every_invalid_field() {
        let (api, _) = api();
        let (status, body) = call(
            api.routes(),
            post(&json!({ "title": " ", "type": "bogus", "priority": "urgent" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation failed");
        let details: Vec<String> = serde_json::from_value(body["details"].clone()).unwrap();
        assert_eq!(details.len(), 4, "{details:?}");
        assert!(details.iter().any(|d| d.contains("title")));
        assert!(details.iter().any(|d| d.contains("bogus")));
        assert!(details.iter().any(|d| d.contains("urgent")));
        assert!(details.iter().any(|d| d.contains("userId")));
    }

    #[tokio::test]
    async fn create_rejects_malformed_json() {
        let (api, _) = api();
        let req = Request::builder()
            .method("POST")
            .uri("/api/tasks")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(api.routes(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"].is_array());
    }

    #[tokio::test]
    async fn get_missing_task_is_404() {
        let (api, _) = api();
        let (status, _) = call(api.routes(), get_uri("/api/tasks/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_returns_stored_task() {
        let (api, store) = api();
        let task = Task::pending(
            TaskId::from("t1"),
            TaskType::Custom,
            UserId::from("u1"),
            json!({}),
        )
        .with_title("x");
        store.save(&task).await.unwrap();

        let (status, body) = call(api.routes(), get_uri("/api/tasks/t1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"]["id"], "t1");
        assert_eq!(body["task"]["title"], "x");
    }

    #[tokio::test]
    async fn list_requires_user_id() {
        let (api, _) = api();
        let (status, body) = call(api.routes(), get_uri("/api/tasks")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0], "userId is required");
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let (api, store) = api();
        for i in 0..5 {
            let mut task = Task::pending(
                TaskId::from(format!("t{i}")),
                if i % 2 == 0 { TaskType::Custom } else { TaskType::WebScraping },
                UserId::from("u1"),
                json!({}),
            );
            task.created_at += chrono::Duration::seconds(i);
            store.save(&task).await.unwrap();
        }
        let other = Task::pending(
            TaskId::from("x"),
            TaskType::Custom,
            UserId::from("u2"),
            json!({}),
        );
        store.save(&other).await.unwrap();

        let (status, body) = call(
            api.clone().routes(),
            get_uri("/api/tasks?userId=u1&limit=2&page=2"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["pagination"],
            json!({"page": 2, "limit": 2, "total": 5, "pages": 3})
        );
        let ids: Vec<&str> = body["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["t2", "t1"]);

        let (_, body) = call(
            api.clone().routes(),
            get_uri("/api/tasks?userId=u1&type=custom&status=pending"),
        )
        .await;
        assert_eq!(body["pagination"]["total"], 3);

        let (status, _) = call(api.routes(), get_uri("/api/tasks?userId=u1&page=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pagination_window_past_end_is_empty() {
        let p = Pagination::new(9, 10, 15);
        assert_eq!(p.pages, 2);
        assert!(p.window().is_empty());
    }
}
