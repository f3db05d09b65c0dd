use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::info;

use super::{short_id, truncate, Notifier};
use crate::chat_log::Role;
use crate::config::ZulipConfig;
use crate::error::NotifyError;

/// Posts each message to a Zulip stream, one topic per conversation.
pub struct ZulipNotifier {
    client: reqwest::Client,
    config: ZulipConfig,
    agent_label: &'static str,
    max_length: usize,
}

impl ZulipNotifier {
    pub const MAX_LENGTH: usize = 10_000;
    const TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(config: ZulipConfig, agent_label: &'static str) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            agent_label,
            max_length: Self::MAX_LENGTH,
        }
    }

    fn render(&self, role: Role, text: &str) -> String {
        let speaker = match role {
            Role::User => "You",
            Role::Agent => self.agent_label,
        };
        format!("**{speaker}**\n\n{}", truncate(text, self.max_length))
    }
}

#[async_trait]
impl Notifier for ZulipNotifier {
    async fn send(
        &self,
        role: Role,
        text: &str,
        conversation_id: &str,
    ) -> Result<(), NotifyError> {
        let content = self.render(role, text);
        let topic = format!("Session {}", short_id(conversation_id));
        let url = format!("{}/api/v1/messages", self.config.site.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.bot_email, Some(&self.config.bot_api_key))
            .form(&[
                ("type", "stream"),
                ("to", self.config.stream.as_str()),
                ("topic", topic.as_str()),
                ("content", content.as_str()),
            ])
            .timeout(Self::TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }

        info!(
            "sent {role} message to stream '{}' ({topic})",
            self.config.stream
        );
        Ok(())
    }
}
