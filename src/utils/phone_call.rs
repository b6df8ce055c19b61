//! SMSC 语音呼叫告警

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::core::alert::AlertSink;
use crate::core::config::{secret_from_env, SmscConfig};
use crate::core::error::AlertError;

const SMSC_SEND_URL: &str = "https://smsc.ru/sys/send.php";
/// 等待时长,重拨间隔,重拨次数
const CALL_PARAMS: &str = "20,10,3";
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// fmt=3 时的 JSON 返回
#[derive(Debug, Deserialize)]
struct SmscResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

pub struct SmscPhoneCall {
    login: String,
    password: String,
    phones: String,
    client: Client,
}

impl SmscPhoneCall {
    pub fn new(login: String, password: String, phones: String) -> Result<Self, AlertError> {
        if login.is_empty() || phones.is_empty() {
            return Err(AlertError::Config("SMSC login/phones 不能为空".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            login,
            password,
            phones,
            client,
        })
    }

    /// 密码从 password_env 指定的环境变量读取
    pub fn from_config(config: &SmscConfig) -> Result<Self, AlertError> {
        let password = secret_from_env(&config.password_env)
            .map_err(|e| AlertError::Config(e.to_string()))?;
        Self::new(config.login.clone(), password, config.phones.clone())
    }

    fn query<'a>(&'a self, message: &'a str) -> Vec<(&'static str, &'a str)> {
        vec![
            ("login", self.login.as_str()),
            ("psw", self.password.as_str()),
            ("phones", self.phones.as_str()),
            ("mes", message),
            ("call", "1"),
            ("voice", "w"),
            ("param", CALL_PARAMS),
            ("fmt", "3"),
        ]
    }
}

#[async_trait]
impl AlertSink for SmscPhoneCall {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        let response = self
            .client
            .get(SMSC_SEND_URL)
            .query(&self.query(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let reply: SmscResponse = response.json().await?;
        if let Some(error) = reply.error {
            return Err(AlertError::Rejected {
                status: status.as_u16(),
                body: format!("{} (code {})", error, reply.error_code.unwrap_or_default()),
            });
        }

        info!("语音告警已发送至 {}", self.phones);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smsc"
    }
}
