//! Asana REST API 客户端
//!
//! 请求体与响应都包在 `{"data": ...}` 里；错误体为 `{"errors": [{"message": ...}]}`。
//! 路径中的 ID 逐段百分号编码，空 ID 与 `.` / `..` 在发请求前拒绝。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::integrations::{IntegrationError, NewTask, TaskChangeSet, TaskSummary, TaskTracker};

pub const ASANA_BASE_URL: &str = "https://app.asana.com/api/1.0";

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    message: String,
}

pub struct AsanaClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl AsanaClient {
    pub fn new(
        base_url: Option<&str>,
        access_token: &str,
        timeout_secs: u64,
    ) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        let raw = base_url.unwrap_or(ASANA_BASE_URL);
        let base_url = Url::parse(raw)
            .map_err(|e| IntegrationError::Transport(format!("invalid Asana base url {}: {}", raw, e)))?;
        Ok(Self {
            http,
            base_url,
            access_token: access_token.to_string(),
        })
    }

    /// 在 base_url 之后追加路径段，每段单独编码（`/` 变成 `%2F`）
    fn url(&self, segments: &[&str]) -> Result<Url, IntegrationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                IntegrationError::Transport(format!(
                    "Asana base url cannot carry a path: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// 发送请求并解出 data；非 2xx 时取 errors[].message 拼成错误信息
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, IntegrationError> {
        if self.access_token.is_empty() {
            return Err(IntegrationError::NotConfigured("Asana access token"));
        }
        let resp = req.bearer_auth(&self.access_token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .filter(|b| !b.errors.is_empty())
                .map(|b| {
                    b.errors
                        .into_iter()
                        .map(|e| e.message)
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or(text);
            return Err(IntegrationError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let envelope: Envelope<T> = resp.json().await?;
        Ok(envelope.data)
    }
}

/// 路径中的 ID 不能为空，也不能是会被 URL 规范化吃掉的 `.` / `..`
fn path_id<'a>(kind: &'static str, id: &'a str) -> Result<&'a str, IntegrationError> {
    let trimmed = id.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(IntegrationError::InvalidId {
            kind,
            id: id.to_string(),
        });
    }
    Ok(trimmed)
}

#[async_trait]
impl TaskTracker for AsanaClient {
    async fn create_task(&self, task: &NewTask) -> Result<Value, IntegrationError> {
        let body = json!({
            "data": {
                "name": task.name,
                "due_on": task.due_on,
                "notes": task.notes,
                "projects": [task.project_id],
            }
        });
        let url = self.url(&["tasks"])?;
        self.send(self.http.post(url).json(&body)).await
    }

    async fn list_tasks_for_project(
        &self,
        project_id: &str,
        limit: u32,
    ) -> Result<Vec<TaskSummary>, IntegrationError> {
        let url = self.url(&["projects", path_id("project id", project_id)?, "tasks"])?;
        let req = self.http.get(url).query(&[("limit", limit.to_string())]);
        self.send(req).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Value, IntegrationError> {
        let url = self.url(&["tasks", path_id("task id", task_id)?])?;
        self.send(self.http.get(url)).await
    }

    async fn update_task(
        &self,
        task_id: &str,
        changes: &TaskChangeSet,
    ) -> Result<Value, IntegrationError> {
        let url = self.url(&["tasks", path_id("task id", task_id)?])?;
        let body = json!({ "data": changes });
        self.send(self.http.put(url).json(&body)).await
    }

    async fn create_comment(&self, task_id: &str, text: &str) -> Result<Value, IntegrationError> {
        let url = self.url(&["tasks", path_id("task id", task_id)?, "stories"])?;
        let body = json!({ "data": { "text": text } });
        self.send(self.http.post(url).json(&body)).await
    }

    async fn search_tasks(
        &self,
        workspace_id: &str,
        query: &str,
        fields: &[&str],
    ) -> Result<Vec<Value>, IntegrationError> {
        let url = self.url(&[
            "workspaces",
            path_id("workspace id", workspace_id)?,
            "tasks",
            "search",
        ])?;
        let req = self
            .http
            .get(url)
            .query(&[("text", query.to_string()), ("opt_fields", fields.join(","))]);
        self.send(req).await
    }
}
