use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::{short_id, truncate, Notifier};
use crate::chat_log::Role;
use crate::config::MattermostConfig;
use crate::error::NotifyError;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    icon_emoji: &'a str,
    attachments: [Attachment<'a>; 1],
}

#[derive(Serialize)]
struct Attachment<'a> {
    color: &'a str,
    text: &'a str,
    footer: String,
}

/// Posts each message through a Mattermost incoming webhook.
pub struct MattermostNotifier {
    client: reqwest::Client,
    config: MattermostConfig,
    agent_label: &'static str,
    max_length: usize,
}

impl MattermostNotifier {
    pub const MAX_LENGTH: usize = 4_000;
    const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(config: MattermostConfig, agent_label: &'static str) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            agent_label,
            max_length: Self::MAX_LENGTH,
        }
    }
}

#[async_trait]
impl Notifier for MattermostNotifier {
    async fn send(
        &self,
        role: Role,
        text: &str,
        conversation_id: &str,
    ) -> Result<(), NotifyError> {
        let (username, icon_emoji, color) = match role {
            Role::User => ("You", ":bust_in_silhouette:", "#0099FF"),
            Role::Agent => (self.agent_label, ":robot_face:", "#9B59B6"),
        };
        let text = truncate(text, self.max_length);

        let payload = WebhookPayload {
            username,
            icon_emoji,
            attachments: [Attachment {
                color,
                text: text.as_ref(),
                footer: format!("Session: {}", short_id(conversation_id)),
            }],
        };

        let response = self
            .client
            .post(self.config.webhook_url.as_str())
            .json(&payload)
            .timeout(Self::TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }

        info!("sent {role} message to Mattermost webhook");
        Ok(())
    }
}
