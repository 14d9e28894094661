//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Scripted）实现 LlmClient：
//! 传入完整对话与可选的操作定义，返回文本与零或多个工具调用。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::{Message, ToolCall};
use crate::tools::OperationDefinition;

/// LLM 服务错误：本地不可恢复，直接让本轮失败
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// 一次补全的结果：文本（可为空）与按顺序排列的工具调用
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { content, tool_calls }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；`tools` 为 None 时不向模型提供任何操作
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[OperationDefinition]>,
    ) -> Result<LlmResponse, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
