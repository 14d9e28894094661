//! Mock LLM 客户端（无需 API）
//!
//! - MockLlmClient：回显用户最后一条消息，未配置 API Key 时兜底使用
//! - ScriptedLlmClient：按预设脚本依次返回响应，并记录每次调用（测试用）

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::memory::{Message, Role};
use crate::tools::OperationDefinition;

/// Mock 客户端：回显用户最后一条消息，从不请求工具
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: Option<&[OperationDefinition]>,
    ) -> Result<LlmResponse, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or("(no input)");

        Ok(LlmResponse::text(format!("Echo from Mock: {}", last_user)))
    }
}

/// 一次被记录的调用：当时的消息快照与是否附带了工具定义
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tool_names: Option<Vec<String>>,
}

/// 脚本客户端：每次 complete 弹出下一条预设结果；脚本耗尽时返回 InvalidResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<LlmResponse, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一次失败（模拟模型服务不可用）
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(message.into()));
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[OperationDefinition]>,
    ) -> Result<LlmResponse, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tool_names: tools.map(|t| t.iter().map(|d| d.name.to_string()).collect()),
            });
        }

        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        match next {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(msg)) => Err(LlmError::Api {
                status: 503,
                body: msg,
            }),
            None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }
}
