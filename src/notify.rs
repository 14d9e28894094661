//! WhatsApp 发送与任务状态通知
//!
//! 直接调用消息通道，不经过模型；收发地址的 `whatsapp:` 前缀由这里补齐。

use std::sync::Arc;

use serde::Serialize;

use crate::integrations::{ensure_whatsapp_prefix, IntegrationError, Messenger};

/// 发送回执，HTTP 接口直接序列化返回
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub status: &'static str,
    pub message_sid: String,
}

/// 任务通知正文
pub fn task_notification_body(task_name: &str, status: &str, due_date: Option<&str>) -> String {
    let mut body = format!("Task update: '{}' has been {}", task_name, status);
    if let Some(due) = due_date.filter(|d| !d.trim().is_empty()) {
        body.push_str(&format!(" due on {}", due));
    }
    body.push('.');
    body
}

pub struct Notifier {
    messenger: Arc<dyn Messenger>,
    from: String,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn Messenger>, from: impl Into<String>) -> Self {
        Self {
            messenger,
            from: from.into(),
        }
    }

    pub async fn send(&self, to: &str, body: &str) -> Result<SendReceipt, IntegrationError> {
        if self.from.trim().is_empty() {
            return Err(IntegrationError::NotConfigured("WhatsApp sender number"));
        }
        let to = ensure_whatsapp_prefix(to);
        let from = ensure_whatsapp_prefix(&self.from);
        let message_sid = self.messenger.send_message(&to, body, &from).await?;
        Ok(SendReceipt {
            status: "success",
            message_sid,
        })
    }

    pub async fn notify_task(
        &self,
        to: &str,
        task_name: &str,
        status: &str,
        due_date: Option<&str>,
    ) -> Result<SendReceipt, IntegrationError> {
        let body = task_notification_body(task_name, status, due_date);
        self.send(to, &body).await
    }
}
