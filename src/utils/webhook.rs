//! Webhook通知模块
//! 通过企业微信机器人发送任务告警

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::alert::AlertSink;
use crate::core::config::WeChatWorkConfig;
use crate::core::error::AlertError;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// 消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl MessageLevel {
    pub fn emoji(&self) -> &str {
        match self {
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Critical => "🚨",
        }
    }
}

/// 企业微信消息格式
#[derive(Debug, Serialize)]
struct WeChatWorkMessage {
    msgtype: String,
    markdown: MarkdownContent,
}

#[derive(Debug, Serialize)]
struct MarkdownContent {
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mentioned_mobile_list: Vec<String>,
}

/// 企业微信返回
#[derive(Debug, Deserialize)]
struct WeChatWorkResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// 企业微信告警
pub struct WeComAlert {
    config: WeChatWorkConfig,
    client: Client,
}

impl WeComAlert {
    pub fn new(config: WeChatWorkConfig) -> Result<Self, AlertError> {
        if config.webhook_url.trim().is_empty() {
            return Err(AlertError::Config("企业微信 webhook_url 为空".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { config, client })
    }

    fn build_message(&self, body: &str, level: MessageLevel) -> WeChatWorkMessage {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let content = format!(
            r#"## {} 波段任务告警

**级别**: {:?}
**时间**: {}

```
{}
```

---
_自动推送 by swingcta_"#,
            level.emoji(),
            level,
            now,
            body
        );

        WeChatWorkMessage {
            msgtype: "markdown".to_string(),
            markdown: MarkdownContent {
                content,
                mentioned_mobile_list: self.config.mentioned_mobile_list.clone(),
            },
        }
    }
}

#[async_trait]
impl AlertSink for WeComAlert {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        let payload = self.build_message(message, MessageLevel::Critical);
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook发送失败: {}", status);
            return Err(AlertError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // 企业微信失败时 HTTP 仍为 200，需要看 errcode
        let reply: WeChatWorkResponse = response.json().await?;
        if reply.errcode != 0 {
            return Err(AlertError::Rejected {
                status: status.as_u16(),
                body: format!("errcode={} errmsg={}", reply.errcode, reply.errmsg),
            });
        }

        info!("成功发送Webhook通知");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "wechat_work"
    }
}
