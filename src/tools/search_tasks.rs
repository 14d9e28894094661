//! search_tasks：在工作区内按关键字搜索任务

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{parse_args, OperationDefinition, TaskContext, Tool, ToolError, SEARCH_TASKS};

/// 搜索结果只取这些字段
pub const SEARCH_FIELDS: &[&str] = &["name", "due_on", "completed", "assignee"];

#[derive(Debug, Deserialize)]
struct SearchTasksArgs {
    query: String,
}

pub struct SearchTasksTool {
    ctx: TaskContext,
}

impl SearchTasksTool {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for SearchTasksTool {
    fn definition(&self) -> &'static OperationDefinition {
        &SEARCH_TASKS
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SearchTasksArgs = parse_args(args)?;
        let found = self
            .ctx
            .tracker
            .search_tasks(&self.ctx.workspace_id, &args.query, SEARCH_FIELDS)
            .await
            .map_err(|e| {
                ToolError::collaborator(format!("searching tasks for '{}'", args.query), e)
            })?;
        Ok(Value::Array(found))
    }
}
