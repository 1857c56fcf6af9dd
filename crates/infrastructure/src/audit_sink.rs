//! 审计日志外发
//!
//! 把审计事件投递到外部日志收集端的 HTTP 实现。发送带请求超时，
//! 失败由上游的审计任务记录并丢弃，从不影响触发请求。

use std::time::Duration;

use async_trait::async_trait;

use application::{AuditEvent, AuditSink};
use application::audit::AuditSinkError;

pub struct HttpAuditSink {
    client: reqwest::Client,
    url: String,
}

impl HttpAuditSink {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn publish(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|err| AuditSinkError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuditSinkError::Unavailable(format!(
                "collector returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Role, UserId};
    use time::OffsetDateTime;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> AuditEvent {
        AuditEvent {
            action: "alert.assign".to_string(),
            actor_id: UserId::new(Uuid::new_v4()),
            actor_role: Role::Moderator,
            entity_type: "alert".to_string(),
            entity_id: Some(Uuid::new_v4().to_string()),
            message: "responsible updated".to_string(),
            source_addr: None,
            occurred_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_publish_posts_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audit"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpAuditSink::new(format!("{}/audit", server.uri()), Duration::from_secs(1));
        sink.publish(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_collector_error_surfaces_to_worker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = HttpAuditSink::new(server.uri(), Duration::from_secs(1));
        let result = sink.publish(&event()).await;
        assert!(result.is_err());
    }
}
