//! Headless Agent 运行时
//!
//! 供终端与 HTTP 前端调用的无界面逻辑：
//! create_agent_components 从配置装配 LLM / Asana / Twilio / 执行器 / 编排器，
//! new_conversation 生成带当天日期的系统提示词，
//! process_message 对单条用户输入跑一轮两阶段协议。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{format_date, AgentError, Clock, Orchestrator, SystemClock, TurnOutcome};
use crate::integrations::{AsanaClient, Messenger, TaskTracker, TwilioWhatsApp};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::Conversation;
use crate::notify::Notifier;
use crate::tools::{build_task_tools, TaskContext, ToolExecutor};

/// 系统提示词中的日期占位符
pub const DATE_PLACEHOLDER: &str = "{date}";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a personal assistant who helps manage tasks in Asana and send WhatsApp messages.
The current date is: {date}
You can help users with the following actions:
1. Create new tasks with names, due dates, and notes
2. View existing tasks in their project
3. Update task details like name, due date, or completion status
4. Add comments to tasks
5. Search for specific tasks

Always provide helpful, concise responses. When creating or updating tasks, confirm the details before proceeding.";

/// 预构建的 Agent 组件，可多会话共享（会话各自持有 Conversation）
pub struct AgentComponents {
    pub orchestrator: Orchestrator,
    pub notifier: Notifier,
    pub clock: Arc<dyn Clock>,
    pub quit_token: String,
    system_prompt_template: String,
}

impl AgentComponents {
    pub fn executor(&self) -> &ToolExecutor {
        self.orchestrator.executor()
    }

    /// 以当前日期渲染系统提示词
    pub fn system_prompt(&self) -> String {
        self.system_prompt_template
            .replace(DATE_PLACEHOLDER, &format_date(self.clock.today()))
    }

    /// 新会话：只含系统提示词
    pub fn new_conversation(&self) -> Conversation {
        Conversation::with_system_prompt(self.system_prompt())
    }
}

/// 根据配置选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = cfg.llm.api_key.as_deref().filter(|k| !k.trim().is_empty());

    match (provider.as_str(), api_key) {
        ("mock", _) => {
            tracing::info!("Using Mock LLM");
            Ok(Arc::new(MockLlmClient))
        }
        ("openai", Some(key)) => {
            let client = OpenAiClient::new(
                Some(&cfg.llm.base_url),
                &cfg.llm.model,
                key,
                cfg.llm.request_timeout_secs,
            )?;
            tracing::info!("Using OpenAI LLM ({})", client.model());
            Ok(Arc::new(client))
        }
        ("openai", None) => {
            tracing::warn!("No OpenAI API key set, using Mock LLM");
            Ok(Arc::new(MockLlmClient))
        }
        (other, _) => Err(AgentError::Config(format!(
            "unknown llm provider '{}'",
            other
        ))),
    }
}

/// 读取系统提示词模板：配置路径 > config/prompts/system.txt > 内置
fn load_system_prompt(path: Option<&Path>) -> String {
    if let Some(path) = path {
        match std::fs::read_to_string(path) {
            Ok(text) => return text,
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "system prompt file unreadable, using built-in prompt"
            ),
        }
        return DEFAULT_SYSTEM_PROMPT.to_string();
    }
    ["config/prompts/system.txt", "../config/prompts/system.txt"]
        .into_iter()
        .map(PathBuf::from)
        .find_map(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 用给定的协作方装配组件（测试注入假实现时直接调用）
pub fn build_components(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    tracker: Arc<dyn TaskTracker>,
    messenger: Arc<dyn Messenger>,
    clock: Arc<dyn Clock>,
) -> Result<AgentComponents, AgentError> {
    let ctx = TaskContext::new(
        tracker,
        clock.clone(),
        cfg.asana.project_id.clone(),
        cfg.asana.workspace_id.clone(),
    )
    .with_default_list_limit(cfg.tools.default_list_limit);
    let executor = ToolExecutor::new(build_task_tools(ctx), cfg.tools.timeout_secs)?;

    let orchestrator = Orchestrator::new(llm, Arc::new(executor))
        .with_parallel(cfg.tools.parallel)
        .with_turn_timeout(cfg.app.turn_timeout_secs);

    Ok(AgentComponents {
        orchestrator,
        notifier: Notifier::new(messenger, cfg.twilio.whatsapp_from.clone()),
        clock,
        quit_token: cfg.app.quit_token.clone(),
        system_prompt_template: load_system_prompt(cfg.app.system_prompt_path.as_deref()),
    })
}

/// 从配置创建全部组件：OpenAI / Asana / Twilio 客户端与系统时钟
pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let llm = create_llm_from_config(cfg)?;

    if cfg.asana.access_token.is_empty() {
        tracing::warn!("ASANA_ACCESS_TOKEN not set, task operations will fail");
    }
    let tracker = AsanaClient::new(
        Some(&cfg.asana.base_url),
        &cfg.asana.access_token,
        cfg.tools.timeout_secs,
    )
    .map_err(|e| AgentError::Config(format!("Asana client: {}", e)))?;

    let messenger = TwilioWhatsApp::new(
        Some(&cfg.twilio.base_url),
        &cfg.twilio.account_sid,
        &cfg.twilio.auth_token,
        cfg.tools.timeout_secs,
    )
    .map_err(|e| AgentError::Config(format!("Twilio client: {}", e)))?;

    build_components(
        cfg,
        llm,
        Arc::new(tracker),
        Arc::new(messenger),
        Arc::new(SystemClock),
    )
}

/// 处理单条用户消息：跑一轮两阶段协议，成功时会话追加本轮消息
pub async fn process_message(
    components: &AgentComponents,
    conversation: &mut Conversation,
    user_input: &str,
) -> Result<TurnOutcome, AgentError> {
    components
        .orchestrator
        .run_turn(conversation, user_input)
        .await
}
