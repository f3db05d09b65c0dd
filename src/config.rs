//! Destination and watch-root configuration.

use std::path::PathBuf;

use clap::ValueEnum;

use crate::chat_log::AiTool;
use crate::error::ConfigError;

/// Which chat system receives the messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Destination {
    Zulip,
    Mattermost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZulipConfig {
    pub site: String,
    pub bot_email: String,
    pub bot_api_key: String,
    pub stream: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MattermostConfig {
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationConfig {
    Zulip(ZulipConfig),
    Mattermost(MattermostConfig),
}

impl DestinationConfig {
    /// Load destination settings from the process environment.
    pub fn from_env(destination: Destination, tool: AiTool) -> Result<Self, ConfigError> {
        Self::from_lookup(destination, tool, |key| std::env::var(key).ok())
    }

    /// Load destination settings through `lookup`. Empty values count as
    /// unset.
    pub fn from_lookup<F>(destination: Destination, tool: AiTool, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        match destination {
            Destination::Zulip => {
                let (stream_key, default_stream) = zulip_stream_var(tool);
                Ok(DestinationConfig::Zulip(ZulipConfig {
                    site: require("ZULIP_SITE")?,
                    bot_email: require("ZULIP_BOT_EMAIL")?,
                    bot_api_key: require("ZULIP_BOT_API_KEY")?,
                    stream: get(stream_key).unwrap_or_else(|| default_stream.to_string()),
                }))
            }
            Destination::Mattermost => {
                let key = mattermost_webhook_var(tool);
                let webhook_url = get(key)
                    .or_else(|| get("MATTERMOST_WEBHOOK_URL"))
                    .ok_or(ConfigError::Missing(key))?;
                Ok(DestinationConfig::Mattermost(MattermostConfig { webhook_url }))
            }
        }
    }

    /// Where messages go, without credentials.
    pub fn describe(&self) -> String {
        match self {
            DestinationConfig::Zulip(c) => format!("{} stream '{}'", c.site, c.stream),
            DestinationConfig::Mattermost(c) => {
                let shown: String = c.webhook_url.chars().take(50).collect();
                format!("Mattermost webhook {shown}...")
            }
        }
    }
}

/// Environment variables a destination understands, for startup diagnostics.
pub fn expected_vars(destination: Destination, tool: AiTool) -> Vec<String> {
    match destination {
        Destination::Zulip => {
            let (stream_key, default_stream) = zulip_stream_var(tool);
            vec![
                "ZULIP_SITE (e.g., https://zulip.example.com)".to_string(),
                "ZULIP_BOT_EMAIL".to_string(),
                "ZULIP_BOT_API_KEY".to_string(),
                format!("{stream_key} (optional, defaults to '{default_stream}')"),
            ]
        }
        Destination::Mattermost => vec![format!(
            "{} (or MATTERMOST_WEBHOOK_URL)",
            mattermost_webhook_var(tool)
        )],
    }
}

fn zulip_stream_var(tool: AiTool) -> (&'static str, &'static str) {
    match tool {
        AiTool::Claude => ("ZULIP_STREAM_CLAUDE_CODE", "claude-code"),
        AiTool::OpenCode => ("ZULIP_STREAM_OPEN_CODE", "opencode"),
    }
}

fn mattermost_webhook_var(tool: AiTool) -> &'static str {
    match tool {
        AiTool::Claude => "MATTERMOST_CLAUDE_WEBHOOK_URL",
        AiTool::OpenCode => "MATTERMOST_OPENCODE_WEBHOOK_URL",
    }
}

/// Resolve the directory to watch: an explicit override (with `~` expanded)
/// or the tool's default storage location.
pub fn watch_root(tool: AiTool, override_root: Option<&str>) -> Result<PathBuf, ConfigError> {
    if let Some(raw) = override_root {
        return Ok(PathBuf::from(shellexpand::tilde(raw).into_owned()));
    }

    let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
    Ok(match tool {
        AiTool::Claude => home.join(".claude").join("projects"),
        AiTool::OpenCode => home
            .join(".local")
            .join("share")
            .join("opencode")
            .join("storage"),
    })
}
