//! Mitigation side effects for blocked IPs.
//!
//! The block set only records decisions; enforcing them belongs to an
//! external firewall agent. [`LogMitigator`] just records the action, while
//! [`WebhookMitigator`] forwards it to an agent over HTTP.

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while notifying the firewall agent
#[derive(Debug, Error)]
pub enum MitigationError {
    #[error("API request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Change applied to an IP's firewall state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MitigationAction {
    Add,
    Delete,
}

impl MitigationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MitigationAction::Add => "ADD",
            MitigationAction::Delete => "DELETE",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mitigator: Send + Sync {
    async fn apply(&self, ip: &str, action: MitigationAction) -> Result<(), MitigationError>;
}

/// Records the action without touching the network stack
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMitigator;

#[async_trait]
impl Mitigator for LogMitigator {
    async fn apply(&self, ip: &str, action: MitigationAction) -> Result<(), MitigationError> {
        info!("[{} BLOCK ACTION] IP {} recorded in block list.", action.as_str(), ip);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct MitigationRequest<'a> {
    ip: &'a str,
    action: MitigationAction,
}

/// Forwards block/unblock actions to a firewall agent endpoint
pub struct WebhookMitigator {
    /// HTTP client
    client: Client,
    /// Agent endpoint
    url: String,
}

impl WebhookMitigator {
    pub fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, url }
    }
}

#[async_trait]
impl Mitigator for WebhookMitigator {
    async fn apply(&self, ip: &str, action: MitigationAction) -> Result<(), MitigationError> {
        let response = self.client
            .post(&self.url)
            .json(&MitigationRequest { ip, action })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MitigationError::InvalidResponse(format!(
                "agent answered {} for {} {}",
                response.status(),
                action.as_str(),
                ip
            )));
        }

        info!("[{} BLOCK ACTION] IP {} forwarded to {}", action.as_str(), ip, self.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mitigator_always_succeeds() {
        tokio_test::assert_ok!(LogMitigator.apply("10.0.0.1", MitigationAction::Add).await);
        tokio_test::assert_ok!(LogMitigator.apply("10.0.0.1", MitigationAction::Delete).await);
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_an_error() {
        let mitigator = WebhookMitigator::new("http://127.0.0.1:1/block".to_string());
        tokio_test::assert_err!(mitigator.apply("10.0.0.1", MitigationAction::Add).await);
    }

    #[test]
    fn test_action_wire_format() {
        let body = serde_json::to_value(MitigationRequest {
            ip: "10.0.0.1",
            action: MitigationAction::Delete,
        })
        .unwrap();
        assert_eq!(body["action"], "DELETE");
    }
}
