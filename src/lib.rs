//! Taskbee - 对话式任务助手
//!
//! 模块划分：
//! - **agent**: 无头运行时（组件装配、会话初始化、单轮处理，供终端 / HTTP 调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、时钟、两阶段工具调用编排
//! - **integrations**: 外部协作方（Asana 任务、Twilio WhatsApp 消息）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话状态（仅追加的消息序列）
//! - **notify**: WhatsApp 发送与任务通知
//! - **observability**: 日志初始化
//! - **server**: HTTP 接口（/chat、任务直通接口、WhatsApp 接口）
//! - **tools**: 操作注册表、五个任务操作与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod observability;
#[cfg(feature = "web")]
pub mod server;
pub mod tools;

pub use agent::{create_agent_components, process_message, AgentComponents};
pub use core::{AgentError, Orchestrator, TurnOutcome};
