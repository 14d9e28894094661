//! update_task：只提交显式给出且非 null 的字段；修改集为空时不发请求

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::integrations::TaskChangeSet;
use crate::tools::{
    parse_args, DueDate, OperationDefinition, TaskContext, Tool, ToolError, UPDATE_TASK,
};

pub const NO_UPDATE_MESSAGE: &str = "no update parameters provided";

#[derive(Debug, Deserialize)]
struct UpdateTaskArgs {
    task_id: String,
    #[serde(default)]
    task_name: Option<String>,
    #[serde(default)]
    due_on: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    notes: Option<String>,
}

pub struct UpdateTaskTool {
    ctx: TaskContext,
}

impl UpdateTaskTool {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }

    fn change_set(&self, args: &UpdateTaskArgs) -> Result<TaskChangeSet, ToolError> {
        let due_on = match args.due_on.as_deref() {
            Some(raw) => Some(
                raw.parse::<DueDate>()?
                    .resolve_string(self.ctx.clock.as_ref()),
            ),
            None => None,
        };
        Ok(TaskChangeSet {
            name: args.task_name.clone(),
            due_on,
            completed: args.completed,
            notes: args.notes.clone(),
        })
    }
}

#[async_trait]
impl Tool for UpdateTaskTool {
    fn definition(&self) -> &'static OperationDefinition {
        &UPDATE_TASK
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: UpdateTaskArgs = parse_args(args)?;
        let changes = self.change_set(&args)?;
        if changes.is_empty() {
            return Ok(json!({ "message": NO_UPDATE_MESSAGE }));
        }
        self.ctx
            .tracker
            .update_task(&args.task_id, &changes)
            .await
            .map_err(|e| ToolError::collaborator(format!("updating task {}", args.task_id), e))
    }
}
