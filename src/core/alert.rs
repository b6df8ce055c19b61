use async_trait::async_trait;
use std::sync::Arc;

use crate::core::error::AlertError;

/// 人工可达的告警通道（电话、企业微信等）
///
/// 每次错误升级只调用一次；返回 Err 表示告警没有送达。
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), AlertError>;

    /// 通道名称，用于日志
    fn name(&self) -> &'static str;
}

/// 只写日志的告警通道，dry-run 或未配置告警时使用
pub struct LogAlert;

#[async_trait]
impl AlertSink for LogAlert {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        log::error!("🚨 告警: {}", message);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// 依次发送到所有通道，任一通道送达即视为成功
pub struct CompositeAlert {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl CompositeAlert {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AlertSink for CompositeAlert {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        let mut last_error = None;
        let mut delivered = false;
        for sink in &self.sinks {
            match sink.notify(message).await {
                Ok(()) => delivered = true,
                Err(err) => {
                    log::warn!("告警通道 {} 发送失败: {}", sink.name(), err);
                    last_error = Some(err);
                }
            }
        }

        match (delivered, last_error) {
            (true, _) => Ok(()),
            (false, Some(err)) => Err(err),
            (false, None) => Err(AlertError::Config("没有可用的告警通道".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingAlert;

    #[async_trait]
    impl AlertSink for FailingAlert {
        async fn notify(&self, _message: &str) -> Result<(), AlertError> {
            Err(AlertError::Rejected {
                status: 502,
                body: "bad gateway".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_any_channel_delivers() {
        let alert = CompositeAlert::new(vec![Arc::new(FailingAlert), Arc::new(LogAlert)]);
        assert!(alert.notify("Error").await.is_ok());
    }

    #[tokio::test]
    async fn test_all_channels_fail() {
        let alert = CompositeAlert::new(vec![Arc::new(FailingAlert)]);
        assert!(matches!(
            alert.notify("Error").await,
            Err(AlertError::Rejected { status: 502, .. })
        ));
        assert!(CompositeAlert::new(Vec::new()).notify("Error").await.is_err());
    }
}
