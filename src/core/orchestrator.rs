//! 两阶段工具调用编排
//!
//! 每轮对话：
//! 1. 意图解析：完整对话 + 操作定义发给模型，得到文本或 ≥1 个工具调用
//! 2. 执行与归纳（仅当有工具调用）：追加 assistant 消息，执行全部调用并按调用顺序追加 tool 结果，
//!    再不带工具定义请求一次模型，拿到最终回复
//!
//! 每轮最多一次工具执行；第二次请求若仍返回工具调用，只取其文本。
//! 一轮在对话副本上进行，成功后才把新增消息并入会话，失败或超时时会话保持不变。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Conversation, Message};
use crate::tools::{OperationResult, ToolExecutor};

/// 一轮对话的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// 最终回复文本
    pub response: String,
    /// 第一阶段是否请求了工具
    pub tool_calls_occurred: bool,
    /// 执行的工具调用数
    pub invocations: usize,
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    /// 第二阶段是否并发执行工具调用
    parallel: bool,
    /// 整轮期限；None 表示不限
    turn_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>) -> Self {
        Self {
            llm,
            executor,
            parallel: true,
            turn_timeout: None,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// 0 表示不设期限
    pub fn with_turn_timeout(mut self, secs: u64) -> Self {
        self.turn_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// 追加用户输入并完成一轮
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        input: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let mut staged = conversation.clone();
        staged.push(Message::user(input))?;
        self.commit(conversation, staged).await
    }

    /// 对已以用户消息结尾的对话完成一轮（/chat 请求携带完整历史时使用）
    pub async fn respond(&self, conversation: &mut Conversation) -> Result<TurnOutcome, AgentError> {
        let staged = conversation.clone();
        self.commit(conversation, staged).await
    }

    async fn commit(
        &self,
        conversation: &mut Conversation,
        mut staged: Conversation,
    ) -> Result<TurnOutcome, AgentError> {
        let outcome = match self.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, self.resolve(&mut staged))
                .await
                .map_err(|_| AgentError::TurnTimeout(limit.as_secs()))??,
            None => self.resolve(&mut staged).await?,
        };
        conversation.append_from(staged)?;
        let (prompt, completion, total) = self.llm.token_usage();
        tracing::debug!(
            prompt_tokens = prompt,
            completion_tokens = completion,
            total_tokens = total,
            "token usage"
        );
        Ok(outcome)
    }

    /// 两阶段协议本体：直接修改传入的对话
    pub async fn resolve(&self, conversation: &mut Conversation) -> Result<TurnOutcome, AgentError> {
        let definitions = self.executor.definitions();
        tracing::debug!(messages = conversation.len(), "phase 1: intent resolution");
        let first = self
            .llm
            .complete(conversation.messages(), Some(definitions))
            .await?;

        if !first.has_tool_calls() {
            let response = first.content.unwrap_or_default();
            conversation.push(Message::assistant(response.clone()))?;
            return Ok(TurnOutcome {
                response,
                tool_calls_occurred: false,
                invocations: 0,
            });
        }

        let calls = first.tool_calls;
        conversation.push(Message::assistant_with_tool_calls(
            first.content,
            calls.clone(),
        ))?;

        tracing::debug!(
            invocations = calls.len(),
            parallel = self.parallel,
            "phase 2: executing tool calls"
        );
        let results: Vec<OperationResult> = if self.parallel {
            join_all(calls.iter().map(|call| self.executor.execute_call(call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push(self.executor.execute_call(call).await);
            }
            results
        };

        for (call, result) in calls.iter().zip(results) {
            conversation.push(Message::tool_result(call, result.to_content()))?;
        }

        tracing::debug!(messages = conversation.len(), "phase 2: final answer");
        let last = self.llm.complete(conversation.messages(), None).await?;
        if last.has_tool_calls() {
            tracing::warn!(
                ignored = last.tool_calls.len(),
                "model requested tools after the tool round, ignoring"
            );
        }
        let response = last.content.unwrap_or_default();
        conversation.push(Message::assistant(response.clone()))?;

        Ok(TurnOutcome {
            response,
            tool_calls_occurred: true,
            invocations: calls.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FixedClock;
    use crate::integrations::{RecordingTracker, TrackerCall};
    use crate::llm::{LlmResponse, ScriptedLlmClient};
    use crate::memory::{Role, ToolCall};
    use crate::observability::capture::capture_logs;
    use crate::tools::{build_task_tools, TaskContext};
    use chrono::NaiveDate;
    use serde_json::Value;

    fn orchestrator(
        llm: Arc<ScriptedLlmClient>,
        tracker: Arc<RecordingTracker>,
    ) -> Orchestrator {
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()));
        let ctx = TaskContext::new(tracker, clock, "p1", "w1");
        let executor = ToolExecutor::new(build_task_tools(ctx), 30).unwrap();
        Orchestrator::new(llm, Arc::new(executor))
    }

    fn result_of(msg: &Message) -> Value {
        serde_json::from_str(msg.text()).unwrap()
    }

    #[tokio::test]
    async fn test_plain_answer_uses_one_call() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![LlmResponse::text("Hi there")]));
        let orch = orchestrator(llm.clone(), Arc::new(RecordingTracker::new()));
        let mut conv = Conversation::with_system_prompt("sys");

        let outcome = orch.run_turn(&mut conv, "hello").await.unwrap();
        assert_eq!(outcome.response, "Hi there");
        assert!(!outcome.tool_calls_occurred);
        assert_eq!(llm.call_count(), 1);
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_token_usage_logged_once_per_turn() {
        let (logs, _guard) = capture_logs();
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            LlmResponse::text("one"),
            LlmResponse::text("two"),
        ]));
        let orch = orchestrator(llm, Arc::new(RecordingTracker::new()));
        let mut conv = Conversation::with_system_prompt("sys");

        orch.run_turn(&mut conv, "a").await.unwrap();
        orch.run_turn(&mut conv, "b").await.unwrap();

        let text = logs.text();
        let lines: Vec<&str> = text.lines().filter(|l| l.contains("token usage")).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("total_tokens=0"), "{}", lines[0]);
    }

    #[tokio::test]
    async fn test_tool_round_uses_two_calls_and_drops_schema() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            LlmResponse::with_tool_calls(
                None,
                vec![ToolCall::new("c1", "list_tasks", r#"{"limit": 1}"#)],
            ),
            LlmResponse::text("You have one task."),
        ]));
        let tracker = Arc::new(
            RecordingTracker::new().with_tasks(vec![serde_json::json!({"gid": "1", "name": "a"})]),
        );
        let orch = orchestrator(llm.clone(), tracker);
        let mut conv = Conversation::with_system_prompt("sys");

        let outcome = orch.run_turn(&mut conv, "what's on my list?").await.unwrap();
        assert!(outcome.tool_calls_occurred);
        assert_eq!(outcome.invocations, 1);
        assert_eq!(outcome.response, "You have one task.");

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_names.as_ref().map(|t| t.len()), Some(5));
        assert!(calls[1].tool_names.is_none());
        // 第二次请求看到了 assistant 调用与 tool 结果
        let roles: Vec<Role> = calls[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool]
        );
        // system, user, assistant(tool_calls), tool, assistant
        assert_eq!(conv.len(), 5);
    }

    #[tokio::test]
    async fn test_results_follow_invocation_order_under_concurrency() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            LlmResponse::with_tool_calls(
                Some("Creating both".into()),
                vec![
                    ToolCall::new("c1", "create_task", r#"{"task_name": "slow"}"#),
                    ToolCall::new("c2", "create_task", r#"{"task_name": "fast"}"#),
                    ToolCall::new("c3", "delete_everything", "{}"),
                ],
            ),
            LlmResponse::text("Done"),
        ]));
        let tracker = Arc::new(RecordingTracker::new().with_create_delay("slow", 50));
        let orch = orchestrator(llm, tracker.clone());
        let mut conv = Conversation::new();

        let outcome = orch.run_turn(&mut conv, "make two").await.unwrap();
        assert_eq!(outcome.invocations, 3);

        let tool_msgs: Vec<&Message> = conv
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        let ids: Vec<&str> = tool_msgs
            .iter()
            .map(|m| m.tool_call_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(result_of(tool_msgs[0])["data"]["name"], "slow");
        assert_eq!(result_of(tool_msgs[1])["data"]["name"], "fast");
        assert_eq!(
            result_of(tool_msgs[2])["error"],
            "unknown operation: delete_everything"
        );

        // 快的先完成，但结果仍按调用顺序追加
        match &tracker.calls()[0] {
            TrackerCall::CreateTask(task) => assert_eq!(task.name, "fast"),
            other => panic!("Expected CreateTask, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sequential_dispatch() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            LlmResponse::with_tool_calls(
                None,
                vec![
                    ToolCall::new("c1", "create_task", r#"{"task_name": "slow"}"#),
                    ToolCall::new("c2", "create_task", r#"{"task_name": "fast"}"#),
                ],
            ),
            LlmResponse::text("Done"),
        ]));
        let tracker = Arc::new(RecordingTracker::new().with_create_delay("slow", 20));
        let orch = orchestrator(llm, tracker.clone()).with_parallel(false);
        let mut conv = Conversation::new();

        orch.run_turn(&mut conv, "make two").await.unwrap();
        match &tracker.calls()[0] {
            TrackerCall::CreateTask(task) => assert_eq!(task.name, "slow"),
            other => panic!("Expected CreateTask, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_arguments_do_not_abort_turn() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            LlmResponse::with_tool_calls(
                None,
                vec![ToolCall::new("c1", "add_comment", "{not json")],
            ),
            LlmResponse::text("Sorry, I could not add that comment."),
        ]));
        let tracker = Arc::new(RecordingTracker::new());
        let orch = orchestrator(llm, tracker.clone());
        let mut conv = Conversation::new();

        let outcome = orch.run_turn(&mut conv, "comment").await.unwrap();
        assert_eq!(outcome.response, "Sorry, I could not add that comment.");
        let tool_msg = conv
            .messages()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(result_of(tool_msg)["status"], "failure");
        assert_eq!(tracker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_second_round_tool_calls_are_ignored() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            LlmResponse::with_tool_calls(None, vec![ToolCall::new("c1", "list_tasks", "")]),
            LlmResponse::with_tool_calls(
                Some("Here you go".into()),
                vec![ToolCall::new("c2", "list_tasks", "")],
            ),
        ]));
        let tracker = Arc::new(RecordingTracker::new());
        let orch = orchestrator(llm.clone(), tracker.clone());
        let mut conv = Conversation::new();

        let outcome = orch.run_turn(&mut conv, "list").await.unwrap();
        assert_eq!(outcome.response, "Here you go");
        assert_eq!(outcome.invocations, 1);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(tracker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_leaves_conversation_unchanged() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec![LlmResponse::with_tool_calls(
                None,
                vec![ToolCall::new("c1", "list_tasks", "")],
            )])
            .then_fail("model overloaded"),
        );
        let orch = orchestrator(llm, Arc::new(RecordingTracker::new()));
        let mut conv = Conversation::with_system_prompt("sys");

        let err = orch.run_turn(&mut conv, "list").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert!(err.to_string().contains("model overloaded"));
        assert_eq!(conv.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_deadline() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            LlmResponse::with_tool_calls(
                None,
                vec![ToolCall::new("c1", "create_task", r#"{"task_name": "slow"}"#)],
            ),
            LlmResponse::text("Done"),
        ]));
        let tracker = Arc::new(RecordingTracker::new().with_create_delay("slow", 10_000));
        let orch = orchestrator(llm, tracker).with_turn_timeout(2);
        let mut conv = Conversation::new();

        let err = orch.run_turn(&mut conv, "slow one").await.unwrap_err();
        assert!(matches!(err, AgentError::TurnTimeout(2)));
        assert!(conv.is_empty());
    }

    #[tokio::test]
    async fn test_respond_to_supplied_history() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![LlmResponse::text("Sure")]));
        let orch = orchestrator(llm.clone(), Arc::new(RecordingTracker::new()));
        let mut conv = Conversation::from_messages(vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("help me"),
        ])
        .unwrap();

        let outcome = orch.respond(&mut conv).await.unwrap();
        assert_eq!(outcome.response, "Sure");
        assert_eq!(llm.calls()[0].messages.len(), 4);
        assert_eq!(conv.len(), 5);
    }
}
