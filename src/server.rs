//! HTTP 接口（feature = "web"）
//!
//! - POST /chat：携带完整历史跑一轮两阶段协议
//! - /tasks/*：五个操作的直通接口，不经过模型，经执行器调用
//! - /whatsapp/send、/whatsapp/notify：直接发消息
//! - GET /health
//!
//! 错误统一返回 `{"detail": "..."}`：操作 / 消息失败为 400，模型失败为 500。

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::agent::AgentComponents;
use crate::memory::{Conversation, Message};
use crate::notify::SendReceipt;
use crate::tools::OperationResult;

pub type AppState = Arc<AgentComponents>;

/// 以 `{"detail": ...}` 返回的错误
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// 请求体 / 查询参数解析失败也走 `{"detail"}`，状态统一为 400
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub has_tool_calls: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub task_name: String,
    #[serde(default = "default_due_on")]
    pub due_on: String,
    #[serde(default)]
    pub notes: String,
}

fn default_due_on() -> String {
    "today".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentRequest {
    pub task_id: String,
    pub comment_text: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub to: String,
    pub task_name: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub due_date: Option<String>,
}

fn default_status() -> String {
    "created".to_string()
}

/// 构建路由；allowed_origins 中无法解析的项被忽略
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(chat))
        .route("/tasks", get(list_tasks))
        .route("/tasks/create", post(create_task))
        .route("/tasks/update", put(update_task))
        .route("/tasks/comment", post(add_comment))
        .route("/tasks/search", get(search_tasks))
        .route("/whatsapp/send", post(whatsapp_send))
        .route("/whatsapp/notify", post(whatsapp_notify))
        .route("/health", get(|| async { "OK" }))
        .layer(cors)
        .with_state(state)
}

/// 把执行器结果映射为 HTTP 响应：成功返回载荷，失败 400 并加上动作前缀
fn operation_response(result: OperationResult, action: &str) -> ApiResult<Value> {
    match result {
        OperationResult::Success { data } => Ok(Json(data)),
        OperationResult::Failure { error } => {
            Err(ApiError::bad_request(format!("Error {}: {}", action, error)))
        }
    }
}

fn to_args<T: Serialize>(body: &T) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::bad_request(e.to_string()))
}

/// 请求消息转为会话；缺少 system 消息时插入当前系统提示词
fn chat_conversation(state: &AgentComponents, req: ChatRequest) -> Result<Conversation, ApiError> {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    for m in req.messages {
        let msg = match m.role.as_str() {
            "system" => Message::system(m.content),
            "user" => Message::user(m.content),
            "assistant" => Message::assistant(m.content),
            other => return Err(ApiError::bad_request(format!("unsupported role: {}", other))),
        };
        messages.push(msg);
    }
    if !messages.iter().any(|m| m.role == crate::memory::Role::System) {
        messages.insert(0, Message::system(state.system_prompt()));
    }
    Conversation::from_messages(messages).map_err(|e| ApiError::bad_request(e.to_string()))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let Json(req) = payload?;
    let request_id = uuid::Uuid::new_v4();
    tracing::info!(%request_id, messages = req.messages.len(), "chat request");

    let mut conversation = chat_conversation(&state, req)?;
    match state.orchestrator.respond(&mut conversation).await {
        Ok(outcome) => {
            tracing::info!(
                %request_id,
                tool_calls = outcome.invocations,
                "chat completed"
            );
            Ok(Json(ChatResponse {
                response: outcome.response,
                has_tool_calls: outcome.tool_calls_occurred,
            }))
        }
        Err(e) => {
            tracing::error!(%request_id, error = %e, "chat failed");
            Err(ApiError::internal(format!("Error chatting with AI: {}", e)))
        }
    }
}

async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = payload?;
    let result = state.executor().execute("create_task", to_args(&req)?).await;
    operation_response(result, "creating task")
}

async fn list_tasks(
    State(state): State<AppState>,
    query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(q) = query?;
    let result = state
        .executor()
        .execute("list_tasks", json!({ "limit": q.limit }))
        .await;
    operation_response(result, "fetching tasks")
}

async fn update_task(
    State(state): State<AppState>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = payload?;
    let result = state.executor().execute("update_task", to_args(&req)?).await;
    operation_response(result, "updating task")
}

async fn add_comment(
    State(state): State<AppState>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = payload?;
    let result = state.executor().execute("add_comment", to_args(&req)?).await;
    operation_response(result, "adding comment")
}

async fn search_tasks(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(q) = query?;
    let result = state
        .executor()
        .execute("search_tasks", json!({ "query": q.query }))
        .await;
    operation_response(result, "searching tasks")
}

async fn whatsapp_send(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<SendReceipt> {
    let Json(req) = payload?;
    state
        .notifier
        .send(&req.to, &req.message)
        .await
        .map(Json)
        .map_err(|e| ApiError::bad_request(format!("Error sending WhatsApp message: {}", e)))
}

async fn whatsapp_notify(
    State(state): State<AppState>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> ApiResult<SendReceipt> {
    let Json(req) = payload?;
    state
        .notifier
        .notify_task(&req.to, &req.task_name, &req.status, req.due_date.as_deref())
        .await
        .map(Json)
        .map_err(|e| ApiError::bad_request(format!("Error sending notification: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::build_components;
    use crate::config::AppConfig;
    use crate::core::FixedClock;
    use crate::integrations::{RecordingMessenger, RecordingTracker, TrackerCall};
    use crate::llm::{LlmClient, LlmResponse, MockLlmClient, ScriptedLlmClient};
    use crate::memory::{Role, ToolCall};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use chrono::NaiveDate;
    use tower::ServiceExt;

    struct Fixture {
        router: Router,
        tracker: Arc<RecordingTracker>,
        messenger: Arc<RecordingMessenger>,
    }

    fn fixture_with(llm: Arc<dyn LlmClient>, tracker: RecordingTracker) -> Fixture {
        let mut cfg = AppConfig::default();
        cfg.asana.project_id = "p1".into();
        cfg.asana.workspace_id = "w1".into();
        cfg.twilio.whatsapp_from = "+14155238886".into();

        let tracker = Arc::new(tracker);
        let messenger = Arc::new(RecordingMessenger::new());
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()));
        let components =
            build_components(&cfg, llm, tracker.clone(), messenger.clone(), clock).unwrap();
        Fixture {
            router: create_router(Arc::new(components), &cfg.web.allowed_origins),
            tracker,
            messenger,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MockLlmClient), RecordingTracker::new())
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let f = fixture();
        let response = f.router.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_chat_inserts_system_prompt() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![LlmResponse::text("Hello!")]));
        let f = fixture_with(llm.clone(), RecordingTracker::new());
        let (status, body) = send(
            &f.router,
            json_request(
                Method::POST,
                "/chat",
                json!({"messages": [{"role": "user", "content": "hi"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"response": "Hello!", "has_tool_calls": false}));

        let sent = &llm.calls()[0].messages;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].text().contains("2026-10-16"));
    }

    #[tokio::test]
    async fn test_chat_runs_tool_round() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            LlmResponse::with_tool_calls(
                None,
                vec![ToolCall::new("c1", "create_task", r#"{"task_name": "Ship report"}"#)],
            ),
            LlmResponse::text("Created 'Ship report'."),
        ]));
        let f = fixture_with(llm, RecordingTracker::new());
        let (status, body) = send(
            &f.router,
            json_request(
                Method::POST,
                "/chat",
                json!({"messages": [
                    {"role": "system", "content": "custom"},
                    {"role": "user", "content": "create Ship report"}
                ]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_tool_calls"], true);
        assert_eq!(body["response"], "Created 'Ship report'.");
        assert_eq!(f.tracker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_chat_rejects_unknown_role() {
        let f = fixture();
        let (status, body) = send(
            &f.router,
            json_request(
                Method::POST,
                "/chat",
                json!({"messages": [{"role": "tool", "content": "x"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "unsupported role: tool");
    }

    #[tokio::test]
    async fn test_malformed_chat_body_is_400_detail() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let f = fixture_with(llm.clone(), RecordingTracker::new());
        let (status, body) = send(
            &f.router,
            json_request(Method::POST, "/chat", json!({"messages": [{"role": "user"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.contains("content"), "{}", detail);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bad_query_string_is_400_detail() {
        let f = fixture();
        for uri in ["/tasks?limit=abc", "/tasks/search"] {
            let (status, body) = send(&f.router, get_request(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["detail"].is_string(), "{}", uri);
        }
        assert_eq!(f.tracker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_llm_failure_is_500() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]).then_fail("quota exceeded"));
        let f = fixture_with(llm, RecordingTracker::new());
        let (status, body) = send(
            &f.router,
            json_request(
                Method::POST,
                "/chat",
                json!({"messages": [{"role": "user", "content": "hi"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Error chatting with AI:"));
        assert!(detail.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_create_task_endpoint_defaults() {
        let f = fixture();
        let (status, body) = send(
            &f.router,
            json_request(Method::POST, "/tasks/create", json!({"task_name": "Write docs"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Write docs");
        assert_eq!(body["due_on"], "2026-10-16");
        assert_eq!(body["notes"], "");
    }

    #[tokio::test]
    async fn test_list_and_search_endpoints() {
        let f = fixture_with(
            Arc::new(MockLlmClient),
            RecordingTracker::new().with_tasks(vec![
                json!({"gid": "1", "name": "Budget review"}),
                json!({"gid": "2", "name": "Team lunch"}),
            ]),
        );
        let (status, body) = send(&f.router, get_request("/tasks?limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(&f.router, get_request("/tasks/search?query=budget")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["gid"], "1");

        let (_, body) = send(&f.router, get_request("/tasks")).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert!(f.tracker.calls().contains(&TrackerCall::ListTasks {
            project_id: "p1".into(),
            limit: 10
        }));
    }

    #[tokio::test]
    async fn test_update_endpoint_without_fields() {
        let f = fixture();
        let (status, body) = send(
            &f.router,
            json_request(Method::PUT, "/tasks/update", json!({"task_id": "123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "no update parameters provided"}));
        assert_eq!(f.tracker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_operation_failure_is_400() {
        let f = fixture_with(
            Arc::new(MockLlmClient),
            RecordingTracker::new().failing("connection reset"),
        );
        let (status, body) = send(
            &f.router,
            json_request(
                Method::POST,
                "/tasks/comment",
                json!({"task_id": "9", "comment_text": "hi"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Error adding comment: add_comment failed"));
        assert!(detail.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_whatsapp_endpoints() {
        let f = fixture();
        let (status, body) = send(
            &f.router,
            json_request(
                Method::POST,
                "/whatsapp/send",
                json!({"to": "+15551234567", "message": "hello"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "success", "message_sid": "SM1"}));

        let (status, _) = send(
            &f.router,
            json_request(
                Method::POST,
                "/whatsapp/notify",
                json!({"to": "+15551234567", "task_name": "Ship report", "due_date": "2026-10-17"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let sent = f.messenger.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "whatsapp:+15551234567");
        assert_eq!(
            sent[1].body,
            "Task update: 'Ship report' has been created due on 2026-10-17."
        );
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let f = fixture();
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = f.router.clone().oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
    }
}
