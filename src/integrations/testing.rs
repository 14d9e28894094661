//! 协作方的内存假实现，记录每次调用，供单元测试与 tests/ 下的集成测试注入

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::integrations::{
    IntegrationError, Messenger, NewTask, TaskChangeSet, TaskSummary, TaskTracker,
};

/// RecordingTracker 收到的一次调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    CreateTask(NewTask),
    ListTasks { project_id: String, limit: u32 },
    GetTask(String),
    UpdateTask(String, TaskChangeSet),
    CreateComment(String, String),
    SearchTasks {
        workspace_id: String,
        query: String,
        fields: Vec<String>,
    },
}

/// 内存任务跟踪器：预置任务、可选统一失败、可按任务名延迟 create_task
#[derive(Debug, Default)]
pub struct RecordingTracker {
    tasks: Vec<Value>,
    failure: Option<String>,
    create_delays_ms: HashMap<String, u64>,
    calls: Mutex<Vec<TrackerCall>>,
    next_gid: AtomicUsize,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置项目中的任务（每项至少含 gid、name）
    pub fn with_tasks(mut self, tasks: Vec<Value>) -> Self {
        self.tasks = tasks;
        self
    }

    /// 所有调用都以传输错误失败
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// 创建指定名称的任务前等待 `ms` 毫秒
    pub fn with_create_delay(mut self, task_name: impl Into<String>, ms: u64) -> Self {
        self.create_delays_ms.insert(task_name.into(), ms);
        self
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn record(&self, call: TrackerCall) -> Result<(), IntegrationError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match &self.failure {
            Some(msg) => Err(IntegrationError::Transport(msg.clone())),
            None => Ok(()),
        }
    }

    fn find(&self, gid: &str) -> Option<&Value> {
        self.tasks.iter().find(|t| t["gid"] == gid)
    }
}

#[async_trait]
impl TaskTracker for RecordingTracker {
    async fn create_task(&self, task: &NewTask) -> Result<Value, IntegrationError> {
        if let Some(ms) = self.create_delays_ms.get(&task.name) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        self.record(TrackerCall::CreateTask(task.clone()))?;
        let n = self.next_gid.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "gid": format!("{}", 1000 + n),
            "name": task.name,
            "due_on": task.due_on,
            "notes": task.notes,
        }))
    }

    async fn list_tasks_for_project(
        &self,
        project_id: &str,
        limit: u32,
    ) -> Result<Vec<TaskSummary>, IntegrationError> {
        self.record(TrackerCall::ListTasks {
            project_id: project_id.to_string(),
            limit,
        })?;
        Ok(self
            .tasks
            .iter()
            .take(limit as usize)
            .map(|t| TaskSummary {
                gid: t["gid"].as_str().unwrap_or_default().to_string(),
                name: t["name"].as_str().map(String::from),
            })
            .collect())
    }

    async fn get_task(&self, task_id: &str) -> Result<Value, IntegrationError> {
        self.record(TrackerCall::GetTask(task_id.to_string()))?;
        self.find(task_id)
            .cloned()
            .ok_or_else(|| IntegrationError::Api {
                status: 404,
                message: format!("task: Unknown object: {}", task_id),
            })
    }

    async fn update_task(
        &self,
        task_id: &str,
        changes: &TaskChangeSet,
    ) -> Result<Value, IntegrationError> {
        self.record(TrackerCall::UpdateTask(
            task_id.to_string(),
            changes.clone(),
        ))?;
        let mut updated = json!({ "gid": task_id });
        if let (Some(obj), Value::Object(changed)) = (updated.as_object_mut(), json!(changes)) {
            obj.extend(changed);
        }
        Ok(updated)
    }

    async fn create_comment(&self, task_id: &str, text: &str) -> Result<Value, IntegrationError> {
        self.record(TrackerCall::CreateComment(
            task_id.to_string(),
            text.to_string(),
        ))?;
        Ok(json!({
            "gid": format!("story-{}", task_id),
            "resource_subtype": "comment_added",
            "text": text,
        }))
    }

    async fn search_tasks(
        &self,
        workspace_id: &str,
        query: &str,
        fields: &[&str],
    ) -> Result<Vec<Value>, IntegrationError> {
        self.record(TrackerCall::SearchTasks {
            workspace_id: workspace_id.to_string(),
            query: query.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        })?;
        let needle = query.to_lowercase();
        Ok(self
            .tasks
            .iter()
            .filter(|t| {
                t["name"]
                    .as_str()
                    .map(|n| n.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

/// 一条已发送的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub body: String,
    pub from: String,
}

/// 内存消息通道：记录发送内容，返回递增的 SM id
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    failure: Option<String>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        to: &str,
        body: &str,
        from: &str,
    ) -> Result<String, IntegrationError> {
        if let Some(msg) = &self.failure {
            return Err(IntegrationError::Transport(msg.clone()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;
        sent.push(SentMessage {
            to: to.to_string(),
            body: body.to_string(),
            from: from.to_string(),
        });
        Ok(format!("SM{}", sent.len()))
    }
}
