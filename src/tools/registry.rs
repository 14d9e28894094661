//! 操作注册表
//!
//! - OPERATIONS：进程内固定、有序的五个操作定义（名称、描述、参数 schema），供 LLM 选择
//! - Tool trait：每个操作的强类型处理器（name / definition / execute）
//! - ToolRegistry：按名称存储处理器，由 ToolExecutor 在启动时与 OPERATIONS 对账

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::integrations::IntegrationError;

/// 参数类型（对应 JSON Schema 的 type）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }
}

/// 单个参数：名称、类型、是否必填、描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub required: bool,
    pub description: &'static str,
}

const fn param(
    name: &'static str,
    param_type: ParamType,
    required: bool,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        param_type,
        required,
        description,
    }
}

/// 操作定义：名称唯一，描述供模型判断相关性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl OperationDefinition {
    /// 参数 JSON Schema（required 按声明顺序，仅列必填项）
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in self.params {
            properties.insert(
                p.name.to_string(),
                json!({
                    "type": p.param_type.as_str(),
                    "description": p.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

pub const CREATE_TASK: OperationDefinition = OperationDefinition {
    name: "create_task",
    description: "Create a task in Asana given the name of the task and when it is due",
    params: &[
        param("task_name", ParamType::String, true, "The name of the task in Asana"),
        param(
            "due_on",
            ParamType::String,
            false,
            "The date the task is due format YYYY-MM-DD. If not given, the current day is used",
        ),
        param("notes", ParamType::String, false, "Additional notes or description for the task"),
    ],
};

pub const LIST_TASKS: OperationDefinition = OperationDefinition {
    name: "list_tasks",
    description: "Get a list of tasks from your Asana project",
    params: &[param(
        "limit",
        ParamType::Integer,
        false,
        "Maximum number of tasks to retrieve",
    )],
};

pub const UPDATE_TASK: OperationDefinition = OperationDefinition {
    name: "update_task",
    description: "Update an existing Asana task details",
    params: &[
        param("task_id", ParamType::String, true, "The Asana task GID to update"),
        param("task_name", ParamType::String, false, "New name for the task"),
        param("due_on", ParamType::String, false, "New due date in YYYY-MM-DD format"),
        param(
            "completed",
            ParamType::Boolean,
            false,
            "Mark task as completed (true) or incomplete (false)",
        ),
        param("notes", ParamType::String, false, "Updated notes for the task"),
    ],
};

pub const ADD_COMMENT: OperationDefinition = OperationDefinition {
    name: "add_comment",
    description: "Add a comment to an existing Asana task",
    params: &[
        param("task_id", ParamType::String, true, "The Asana task GID"),
        param("comment_text", ParamType::String, true, "The comment text to add to the task"),
    ],
};

pub const SEARCH_TASKS: OperationDefinition = OperationDefinition {
    name: "search_tasks",
    description: "Search for tasks by keyword",
    params: &[param(
        "query",
        ParamType::String,
        true,
        "Search terms to find relevant tasks",
    )],
};

/// 全部操作，顺序固定
pub const OPERATIONS: &[OperationDefinition] =
    &[CREATE_TASK, LIST_TASKS, UPDATE_TASK, ADD_COMMENT, SEARCH_TASKS];

pub fn list_operations() -> &'static [OperationDefinition] {
    OPERATIONS
}

/// 处理器错误：参数不合法，或外部协作方调用失败（附带上下文）
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{context}: {source}")]
    Collaborator {
        context: String,
        #[source]
        source: IntegrationError,
    },
}

impl ToolError {
    pub fn collaborator(context: impl Into<String>, source: IntegrationError) -> Self {
        ToolError::Collaborator {
            context: context.into(),
            source,
        }
    }
}

/// 把 JSON 参数解析为处理器的强类型参数
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// 操作处理器：定义来自 OPERATIONS，执行结果为成功载荷（JSON）或 ToolError
#[async_trait]
pub trait Tool: Send + Sync {
    /// 对应的操作定义
    fn definition(&self) -> &'static OperationDefinition;

    fn name(&self) -> &str {
        self.definition().name
    }

    /// 执行操作
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// 处理器表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 已注册的处理器名，按名称排序
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
