//! list_tasks：先取项目任务摘要（最多 limit 条），再逐条取详情
//!
//! Asana 的项目任务接口只返回摘要，因此是一次列表 + N 次详情请求；任何一次失败即整体失败。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{parse_args, OperationDefinition, TaskContext, Tool, ToolError, LIST_TASKS};

/// Asana 分页上限
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct ListTasksArgs {
    #[serde(default)]
    limit: Option<u32>,
}

pub struct ListTasksTool {
    ctx: TaskContext,
}

impl ListTasksTool {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListTasksTool {
    fn definition(&self) -> &'static OperationDefinition {
        &LIST_TASKS
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ListTasksArgs = parse_args(args)?;
        let limit = args
            .limit
            .unwrap_or(self.ctx.default_list_limit)
            .clamp(1, MAX_LIMIT);

        let tracker = &self.ctx.tracker;
        let summaries = tracker
            .list_tasks_for_project(&self.ctx.project_id, limit)
            .await
            .map_err(|e| ToolError::collaborator("listing project tasks", e))?;

        let mut detailed = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            let task = tracker.get_task(&summary.gid).await.map_err(|e| {
                ToolError::collaborator(format!("fetching task {}", summary.gid), e)
            })?;
            detailed.push(task);
        }
        Ok(Value::Array(detailed))
    }
}
