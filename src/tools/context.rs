//! 操作处理器共享的运行时依赖：任务跟踪器、时钟与项目 / 工作区标识

use std::sync::Arc;

use crate::core::Clock;
use crate::integrations::TaskTracker;

#[derive(Clone)]
pub struct TaskContext {
    pub tracker: Arc<dyn TaskTracker>,
    pub clock: Arc<dyn Clock>,
    pub project_id: String,
    pub workspace_id: String,
    /// list_tasks 未给 limit 时的条数
    pub default_list_limit: u32,
}

impl TaskContext {
    pub fn new(
        tracker: Arc<dyn TaskTracker>,
        clock: Arc<dyn Clock>,
        project_id: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            clock,
            project_id: project_id.into(),
            workspace_id: workspace_id.into(),
            default_list_limit: 10,
        }
    }

    pub fn with_default_list_limit(mut self, limit: u32) -> Self {
        self.default_list_limit = limit;
        self
    }
}
