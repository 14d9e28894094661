//! add_comment：给任务添加评论（Asana story）

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{parse_args, OperationDefinition, TaskContext, Tool, ToolError, ADD_COMMENT};

#[derive(Debug, Deserialize)]
struct AddCommentArgs {
    task_id: String,
    comment_text: String,
}

pub struct AddCommentTool {
    ctx: TaskContext,
}

impl AddCommentTool {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for AddCommentTool {
    fn definition(&self) -> &'static OperationDefinition {
        &ADD_COMMENT
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: AddCommentArgs = parse_args(args)?;
        self.ctx
            .tracker
            .create_comment(&args.task_id, &args.comment_text)
            .await
            .map_err(|e| {
                ToolError::collaborator(format!("adding comment to task {}", args.task_id), e)
            })
    }
}
