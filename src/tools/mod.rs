//! 任务操作：注册表、五个处理器与执行器

pub mod add_comment;
pub mod context;
pub mod create_task;
pub mod due_date;
pub mod executor;
pub mod list_tasks;
pub mod registry;
pub mod search_tasks;
pub mod update_task;

pub use add_comment::AddCommentTool;
pub use context::TaskContext;
pub use create_task::CreateTaskTool;
pub use due_date::DueDate;
pub use executor::{OperationResult, ToolExecutor};
pub use list_tasks::ListTasksTool;
pub use registry::{
    list_operations, parse_args, OperationDefinition, ParamSpec, ParamType, Tool,
    ToolError, ToolRegistry, ADD_COMMENT, CREATE_TASK, LIST_TASKS, OPERATIONS, SEARCH_TASKS,
    UPDATE_TASK,
};
pub use search_tasks::{SearchTasksTool, SEARCH_FIELDS};
pub use update_task::{UpdateTaskTool, NO_UPDATE_MESSAGE};

/// 注册全部五个操作处理器，共享同一个 TaskContext
pub fn build_task_tools(ctx: TaskContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CreateTaskTool::new(ctx.clone()));
    registry.register(ListTasksTool::new(ctx.clone()));
    registry.register(UpdateTaskTool::new(ctx.clone()));
    registry.register(AddCommentTool::new(ctx.clone()));
    registry.register(SearchTasksTool::new(ctx));
    registry
}
