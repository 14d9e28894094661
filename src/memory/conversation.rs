//! 对话状态：按时间顺序仅追加的消息序列
//!
//! 一个会话独占一个 Conversation；只能追加，不回滚、不原地修改。
//! 工具结果消息必须出现在发起该调用的 assistant 消息之后。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 消息角色（与 LLM API 一致，工具结果为 `tool`）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// 模型发起的一次工具调用：id 由模型服务分配，arguments 为原始 JSON 字符串
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// 单条消息
///
/// - assistant 消息可携带零或多个 tool_calls（此时 content 可为空）
/// - tool 消息携带 tool_call_id 与操作名
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// 带工具调用列表的 assistant 消息（模型原样回复）
    pub fn assistant_with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    /// 工具结果消息：回填调用 id 与操作名
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConversationError {
    #[error("tool result for call '{0}' has no preceding assistant tool call")]
    OrphanToolResult(String),

    #[error("tool result message is missing its tool_call_id")]
    MissingToolCallId,

    #[error("cannot merge a conversation that does not extend this one")]
    Diverged,
}

/// 对话状态：仅追加
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    /// 从外部提供的历史构建（如 /chat 请求），逐条校验因果顺序
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, ConversationError> {
        let mut conversation = Self::new();
        for msg in messages {
            conversation.push(msg)?;
        }
        Ok(conversation)
    }

    /// 追加一条消息；工具结果必须能找到之前发起它的 assistant 调用
    pub fn push(&mut self, msg: Message) -> Result<(), ConversationError> {
        if msg.role == Role::Tool {
            let id = msg
                .tool_call_id
                .as_deref()
                .ok_or(ConversationError::MissingToolCallId)?;
            let issued = self
                .messages
                .iter()
                .rev()
                .filter(|m| m.role == Role::Assistant)
                .any(|m| m.tool_calls.iter().any(|c| c.id == id));
            if !issued {
                return Err(ConversationError::OrphanToolResult(id.to_string()));
            }
        }
        self.messages.push(msg);
        Ok(())
    }

    /// 把 `staged`（以本对话为前缀的副本）中新增的消息追加进来
    pub fn append_from(&mut self, staged: Conversation) -> Result<usize, ConversationError> {
        let base = self.messages.len();
        if staged.messages.len() < base || staged.messages[..base] != self.messages[..] {
            return Err(ConversationError::Diverged);
        }
        let added = staged.messages.len() - base;
        for msg in staged.messages.into_iter().skip(base) {
            self.push(msg)?;
        }
        Ok(added)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
