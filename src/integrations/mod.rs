//! 外部协作方：任务跟踪（Asana）与消息通道（Twilio WhatsApp）
//!
//! 执行器只依赖这里的 TaskTracker / Messenger trait，具体实现在启动时注入，测试中替换为 testing 里的假实现。
//! 所有调用都是单次请求，不重试；失败以 IntegrationError 返回。

pub mod asana;
pub mod testing;
pub mod whatsapp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use asana::AsanaClient;
pub use testing::{RecordingMessenger, RecordingTracker, TrackerCall};
pub use whatsapp::{ensure_whatsapp_prefix, TwilioWhatsApp};

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("invalid {kind}: \"{id}\"")]
    InvalidId { kind: &'static str, id: String },
}

impl From<reqwest::Error> for IntegrationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            IntegrationError::Decode(e.to_string())
        } else {
            IntegrationError::Transport(e.to_string())
        }
    }
}

/// 新建任务请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    /// YYYY-MM-DD
    pub due_on: String,
    pub notes: String,
    pub project_id: String,
}

/// 稀疏修改集：只序列化显式给出的字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskChangeSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TaskChangeSet {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.due_on.is_none() && self.completed.is_none() && self.notes.is_none()
    }
}

/// 项目任务列表中的摘要项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub gid: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// 任务跟踪服务
#[async_trait]
pub trait TaskTracker: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> Result<Value, IntegrationError>;

    async fn list_tasks_for_project(
        &self,
        project_id: &str,
        limit: u32,
    ) -> Result<Vec<TaskSummary>, IntegrationError>;

    async fn get_task(&self, task_id: &str) -> Result<Value, IntegrationError>;

    async fn update_task(
        &self,
        task_id: &str,
        changes: &TaskChangeSet,
    ) -> Result<Value, IntegrationError>;

    /// 评论在 Asana 中是 story
    async fn create_comment(&self, task_id: &str, text: &str) -> Result<Value, IntegrationError>;

    async fn search_tasks(
        &self,
        workspace_id: &str,
        query: &str,
        fields: &[&str],
    ) -> Result<Vec<Value>, IntegrationError>;
}

/// 消息通道：返回消息 id
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, to: &str, body: &str, from: &str)
        -> Result<String, IntegrationError>;
}
