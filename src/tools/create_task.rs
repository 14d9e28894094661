//! create_task：在配置的项目中新建任务，due_on 缺省或为 today 时取调用时刻的日期

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::integrations::NewTask;
use crate::tools::{
    parse_args, DueDate, OperationDefinition, TaskContext, Tool, ToolError, CREATE_TASK,
};

#[derive(Debug, Deserialize)]
struct CreateTaskArgs {
    task_name: String,
    #[serde(default)]
    due_on: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

pub struct CreateTaskTool {
    ctx: TaskContext,
}

impl CreateTaskTool {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn definition(&self) -> &'static OperationDefinition {
        &CREATE_TASK
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CreateTaskArgs = parse_args(args)?;
        let name = args.task_name.trim();
        if name.is_empty() {
            return Err(ToolError::InvalidArguments(
                "task_name must not be empty".to_string(),
            ));
        }
        let due_on = DueDate::parse_or_today(args.due_on.as_deref())?
            .resolve_string(self.ctx.clock.as_ref());

        let task = NewTask {
            name: name.to_string(),
            due_on,
            notes: args.notes.unwrap_or_default(),
            project_id: self.ctx.project_id.clone(),
        };
        self.ctx
            .tracker
            .create_task(&task)
            .await
            .map_err(|e| ToolError::collaborator(format!("creating task '{}'", task.name), e))
    }
}
