//! Twilio WhatsApp 消息通道
//!
//! 通过 Twilio Messages API 发送 WhatsApp 消息（表单提交 + Basic Auth）。
//! 收发地址必须带 `whatsapp:` 前缀，发送前统一补齐。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::integrations::{IntegrationError, Messenger};

pub const TWILIO_BASE_URL: &str = "https://api.twilio.com";

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// 补齐 `whatsapp:` 前缀；已有前缀时原样返回
pub fn ensure_whatsapp_prefix(address: &str) -> String {
    let address = address.trim();
    if address.starts_with(WHATSAPP_PREFIX) {
        address.to_string()
    } else {
        format!("{}{}", WHATSAPP_PREFIX, address)
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: String,
}

pub struct TwilioWhatsApp {
    http: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioWhatsApp {
    pub fn new(
        base_url: Option<&str>,
        account_sid: &str,
        auth_token: &str,
        timeout_secs: u64,
    ) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(TWILIO_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
        })
    }
}

#[async_trait]
impl Messenger for TwilioWhatsApp {
    async fn send_message(
        &self,
        to: &str,
        body: &str,
        from: &str,
    ) -> Result<String, IntegrationError> {
        if self.account_sid.is_empty() || self.auth_token.is_empty() {
            return Err(IntegrationError::NotConfigured("Twilio credentials"));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let to = ensure_whatsapp_prefix(to);
        let from = ensure_whatsapp_prefix(from);
        let form = [("To", to.as_str()), ("From", from.as_str()), ("Body", body)];

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TwilioErrorBody>(&text)
                .map(|b| b.message)
                .unwrap_or(text);
            return Err(IntegrationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let sent: SentMessage = resp.json().await?;
        tracing::info!(sid = %sent.sid, to = %to, "WhatsApp message sent");
        Ok(sent.sid)
    }
}
