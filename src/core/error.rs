//! Agent 错误类型
//!
//! 只有 LLM 调用失败（以及会话结构损坏、配置错误、整轮超时）会终止一轮对话；
//! 单个操作的失败在执行器边界被转成失败结果，不会走到这里。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::ConversationError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Turn timed out after {0}s")]
    TurnTimeout(u64),
}
