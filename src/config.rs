//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TASKBEE__*` 覆盖（双下划线表示嵌套，如 `TASKBEE__LLM__MODEL=gpt-4o-mini`），
//! 最后叠加常用的扁平变量（`OPENAI_API_KEY`、`ASANA_ACCESS_TOKEN`、`TWILIO_AUTH_TOKEN` 等）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub asana: AsanaSection,
    pub twilio: TwilioSection,
    pub web: WebSection,
}

/// [app] 段：退出口令、整轮期限、系统提示词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 终端输入该口令即退出
    pub quit_token: String,
    /// 整轮（两次模型调用 + 工具执行）期限，0 为不限
    pub turn_timeout_secs: u64,
    /// 系统提示词文件，`{date}` 会被替换为当天日期；未设置时使用内置提示词
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            quit_token: "q".to_string(),
            turn_timeout_secs: 0,
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock；openai 但没有 API Key 时回退到 mock
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: crate::llm::openai::OPENAI_BASE_URL.to_string(),
            api_key: None,
            request_timeout_secs: 60,
        }
    }
}

/// [tools] 段：单次操作超时、并发执行、list_tasks 默认条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub timeout_secs: u64,
    pub parallel: bool,
    pub default_list_limit: u32,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            parallel: true,
            default_list_limit: 10,
        }
    }
}

/// [asana] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsanaSection {
    pub base_url: String,
    pub access_token: String,
    pub project_id: String,
    pub workspace_id: String,
}

impl Default for AsanaSection {
    fn default() -> Self {
        Self {
            base_url: crate::integrations::asana::ASANA_BASE_URL.to_string(),
            access_token: String::new(),
            project_id: String::new(),
            workspace_id: String::new(),
        }
    }
}

/// [twilio] 段：whatsapp_from 为发送方号码（可不带 whatsapp: 前缀）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwilioSection {
    pub base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub whatsapp_from: String,
}

impl Default for TwilioSection {
    fn default() -> Self {
        Self {
            base_url: crate::integrations::whatsapp::TWILIO_BASE_URL.to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            whatsapp_from: String::new(),
        }
    }
}

/// [web] 段：监听端口与 CORS 允许的来源
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: 8000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// 从 config 目录加载配置，环境变量可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 TASKBEE__*（双下划线表示嵌套键）
/// 4. 最后叠加扁平变量（见 apply_env_overrides）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TASKBEE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// 用扁平环境变量覆盖对应字段；空值忽略。`lookup` 便于测试时不读真实环境
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("OPENAI_API_KEY") {
        cfg.llm.api_key = Some(v);
    }
    if let Some(v) = get("OPENAI_MODEL") {
        cfg.llm.model = v;
    }
    if let Some(v) = get("OPENAI_BASE_URL") {
        cfg.llm.base_url = v;
    }
    if let Some(v) = get("ASANA_ACCESS_TOKEN") {
        cfg.asana.access_token = v;
    }
    if let Some(v) = get("ASANA_PROJECT_ID") {
        cfg.asana.project_id = v;
    }
    if let Some(v) = get("ASANA_WORKSPACE_ID") {
        cfg.asana.workspace_id = v;
    }
    if let Some(v) = get("TWILIO_ACCOUNT_SID") {
        cfg.twilio.account_sid = v;
    }
    if let Some(v) = get("TWILIO_AUTH_TOKEN") {
        cfg.twilio.auth_token = v;
    }
    if let Some(v) = get("TWILIO_WHATSAPP_FROM") {
        cfg.twilio.whatsapp_from = v;
    }
    if let Some(v) = get("TASKBEE_WEB_PORT") {
        match v.parse() {
            Ok(port) => cfg.web.port = port,
            Err(_) => tracing::warn!(value = %v, "TASKBEE_WEB_PORT is not a valid port, ignoring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.quit_token, "q");
        assert_eq!(cfg.app.turn_timeout_secs, 0);
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model, "gpt-4o");
        assert_eq!(cfg.tools.timeout_secs, 30);
        assert!(cfg.tools.parallel);
        assert_eq!(cfg.tools.default_list_limit, 10);
        assert_eq!(cfg.asana.base_url, "https://app.asana.com/api/1.0");
        assert_eq!(cfg.twilio.base_url, "https://api.twilio.com");
        assert_eq!(cfg.web.port, 8000);
        assert_eq!(cfg.web.allowed_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_load_explicit_file_keeps_unset_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
model = "gpt-4o-mini"

[asana]
project_id = "p42"

[tools]
parallel = false
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.asana.project_id, "p42");
        assert!(!cfg.tools.parallel);
        assert_eq!(cfg.tools.timeout_secs, 30);
        assert_eq!(cfg.app.quit_token, "q");
    }

    #[test]
    fn test_flat_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("ASANA_ACCESS_TOKEN", "asana-token"),
            ("ASANA_WORKSPACE_ID", "w9"),
            ("TWILIO_WHATSAPP_FROM", "+14155238886"),
            ("TASKBEE_WEB_PORT", "9100"),
            ("OPENAI_MODEL", "   "),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.asana.access_token, "asana-token");
        assert_eq!(cfg.asana.workspace_id, "w9");
        assert_eq!(cfg.twilio.whatsapp_from, "+14155238886");
        assert_eq!(cfg.web.port, 9100);
        // 空白值不覆盖
        assert_eq!(cfg.llm.model, "gpt-4o");
    }

    #[test]
    fn test_invalid_port_is_ignored() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| {
            (k == "TASKBEE_WEB_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(cfg.web.port, 8000);
    }
}
