//! 操作执行器
//!
//! 持有 ToolRegistry 与单次调用超时。execute(name, args) 总是返回 OperationResult：
//! 未知操作、参数错误、协作方失败、超时都在这里变成失败结果，不会向上传播。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::tools::{list_operations, OperationDefinition, ToolRegistry};

/// 单次操作的结果，序列化为 `{"status":"success","data":...}` 或 `{"status":"failure","error":"..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult {
    Success { data: Value },
    Failure { error: String },
}

impl OperationResult {
    pub fn success(data: Value) -> Self {
        OperationResult::Success { data }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        OperationResult::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            OperationResult::Failure { error } => Some(error),
            OperationResult::Success { .. } => None,
        }
    }

    /// 作为 tool 消息内容写回对话
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"failure","error":"unserializable result: {}"}}"#, e)
        })
    }
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    /// 注册表必须与 OPERATIONS 一一对应，否则启动失败
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Result<Self, AgentError> {
        let mut expected: Vec<String> = list_operations()
            .iter()
            .map(|d| d.name.to_string())
            .collect();
        expected.sort();
        let registered = registry.tool_names();
        if registered != expected {
            return Err(AgentError::Config(format!(
                "operation handlers {:?} do not match operation definitions {:?}",
                registered, expected
            )));
        }
        Ok(Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// 提供给 LLM 的操作定义（固定顺序）
    pub fn definitions(&self) -> &'static [OperationDefinition] {
        list_operations()
    }

    /// 执行模型发起的一次调用：参数是 JSON 字符串，空串视为 `{}`
    pub async fn execute_call(&self, call: &ToolCall) -> OperationResult {
        let raw = call.arguments.trim();
        let args = if raw.is_empty() {
            Ok(json!({}))
        } else {
            serde_json::from_str::<Value>(raw)
        };
        match args {
            Ok(args) => self.execute(&call.name, args).await,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "malformed tool arguments");
                let result = OperationResult::failure(format!(
                    "{} failed: malformed arguments: {}",
                    call.name, e
                ));
                log_audit(&audit_event(&call.name, &result, "error", 0, preview(raw)));
                result
            }
        }
    }

    /// 按名称执行操作；结果总是 OperationResult
    pub async fn execute(&self, name: &str, args: Value) -> OperationResult {
        let start = Instant::now();
        let args_preview = preview(&args.to_string());

        let (result, outcome) = match self.registry.get(name) {
            None => (
                OperationResult::failure(format!("unknown operation: {}", name)),
                "unknown",
            ),
            Some(tool) => match timeout(self.timeout, tool.execute(args)).await {
                Ok(Ok(data)) => (OperationResult::success(data), "ok"),
                Ok(Err(e)) => (
                    OperationResult::failure(format!("{} failed: {}", name, e)),
                    "error",
                ),
                Err(_) => (
                    OperationResult::failure(format!(
                        "{} timed out after {}s",
                        name,
                        self.timeout.as_secs()
                    )),
                    "timeout",
                ),
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        log_audit(&audit_event(name, &result, outcome, duration_ms, args_preview));
        result
    }
}

/// 审计记录；outcome 取 ok / error / unknown / timeout
fn audit_event(
    name: &str,
    result: &OperationResult,
    outcome: &str,
    duration_ms: u64,
    args_preview: String,
) -> Value {
    json!({
        "event": "tool_audit",
        "tool": name,
        "ok": result.is_success(),
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": args_preview,
    })
}

fn log_audit(audit: &Value) {
    tracing::info!(audit = %audit, "tool");
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
