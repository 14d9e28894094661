//! 记忆层：单会话对话状态（仅内存，不持久化）

pub mod conversation;

pub use conversation::{Conversation, ConversationError, Message, Role, ToolCall};
