// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and normalises chat/API credentials
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cooldown::CooldownMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chat: ChatConfig,
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub clips: ClipsConfig,
    pub discord: DiscordConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_irc_host")]
    pub host: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    /// Channel to join, stored without the leading '#'
    pub channel: String,
    /// Login used for NICK; falls back to the channel name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub oauth_token: String,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("channel", &self.channel)
            .field("username", &self.username)
            .field("oauth_token", &"[REDACTED]")
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TwitchConfig {
    pub client_id: String,
    /// Bearer token for the API; derived from the chat token when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl std::fmt::Debug for TwitchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchConfig")
            .field("client_id", &self.client_id)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base", &self.api_base)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipsConfig {
    #[serde(default = "default_trigger")]
    pub trigger: String,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub cooldown_mode: CooldownMode,
    /// Seconds of stream captured into each clip (Twitch accepts 5 to 60)
    #[serde(default = "default_clip_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_clip_base_url")]
    pub base_url: String,
}

impl Default for ClipsConfig {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
            cooldown_secs: default_cooldown_secs(),
            cooldown_mode: CooldownMode::default(),
            duration_secs: default_clip_duration_secs(),
            base_url: default_clip_base_url(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    #[serde(default = "default_footer_text")]
    pub footer_text: String,
    #[serde(default = "default_footer_icon_url")]
    pub footer_icon_url: String,
    /// Image used when a creator avatar cannot be resolved
    #[serde(default = "default_avatar_url")]
    pub fallback_avatar_url: String,
}

// The webhook URL embeds its own secret token
impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("webhook_url", &"[REDACTED]")
            .field("footer_text", &self.footer_text)
            .field("footer_icon_url", &self.footer_icon_url)
            .field("fallback_avatar_url", &self.fallback_avatar_url)
            .finish()
    }
}

fn default_irc_host() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_irc_port() -> u16 {
    6667
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_api_base() -> String {
    "https://api.twitch.tv/helix".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_trigger() -> String {
    "!clip".to_string()
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_clip_duration_secs() -> u64 {
    60
}

fn default_clip_base_url() -> String {
    "https://clips.twitch.tv".to_string()
}

fn default_footer_text() -> String {
    "Lore Clipper Bot • Twitch Clips".to_string()
}

pub const DEFAULT_FOOTER_ICON_URL: &str = "https://static-cdn.jtvnw.net/jtv_user_pictures/8a6381c7-d0c0-4576-b179-38bd5ce1d6af-profile_image-70x70.png";

pub const DEFAULT_AVATAR_URL: &str =
    "https://static-cdn.jtvnw.net/user-default-pictures-uv/cdd517fe-def4-11e9-948e-784f43822e80-profile_image-300x300.png";

fn default_footer_icon_url() -> String {
    DEFAULT_FOOTER_ICON_URL.to_string()
}

fn default_avatar_url() -> String {
    DEFAULT_AVATAR_URL.to_string()
}

impl Config {
    /// Load configuration from the TOML file (if any) with environment variable overrides
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CLIPPER_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            Config {
                chat: ChatConfig {
                    host: default_irc_host(),
                    port: default_irc_port(),
                    channel: String::new(),
                    username: None,
                    oauth_token: String::new(),
                    reconnect_delay_secs: default_reconnect_delay_secs(),
                },
                twitch: TwitchConfig {
                    client_id: String::new(),
                    access_token: None,
                    api_base: default_api_base(),
                    http_timeout_secs: default_http_timeout_secs(),
                },
                clips: ClipsConfig::default(),
                discord: DiscordConfig {
                    webhook_url: String::new(),
                    footer_text: default_footer_text(),
                    footer_icon_url: default_footer_icon_url(),
                    fallback_avatar_url: default_avatar_url(),
                },
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TWITCH_IRC_HOST") {
            self.chat.host = val;
        }
        if let Ok(val) = std::env::var("TWITCH_IRC_PORT") {
            self.chat.port = val.parse().with_context(|| {
                format!("TWITCH_IRC_PORT must be a valid port number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("TWITCH_CHANNEL") {
            self.chat.channel = val;
        }
        if let Ok(val) = std::env::var("TWITCH_BOT_USERNAME") {
            self.chat.username = Some(val);
        }
        if let Ok(val) = std::env::var("TWITCH_OAUTH_TOKEN") {
            self.chat.oauth_token = val;
        }
        if let Ok(val) = std::env::var("RECONNECT_DELAY_SECS") {
            self.chat.reconnect_delay_secs = parse_secs("RECONNECT_DELAY_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("TWITCH_CLIENT_ID") {
            self.twitch.client_id = val;
        }
        if let Ok(val) = std::env::var("TWITCH_ACCESS_TOKEN") {
            self.twitch.access_token = Some(val);
        }
        if let Ok(val) = std::env::var("TWITCH_API_BASE") {
            self.twitch.api_base = val;
        }
        if let Ok(val) = std::env::var("HTTP_TIMEOUT_SECS") {
            self.twitch.http_timeout_secs = parse_secs("HTTP_TIMEOUT_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("CLIP_TRIGGER") {
            self.clips.trigger = val;
        }
        if let Ok(val) = std::env::var("CLIP_COOLDOWN_SECS") {
            self.clips.cooldown_secs = parse_secs("CLIP_COOLDOWN_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("COOLDOWN_MODE") {
            self.clips.cooldown_mode = val.parse()?;
        }
        if let Ok(val) = std::env::var("CLIP_DURATION_SECS") {
            self.clips.duration_secs = parse_secs("CLIP_DURATION_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("CLIP_BASE_URL") {
            self.clips.base_url = val;
        }
        if let Ok(val) = std::env::var("DISCORD_WEBHOOK_URL") {
            self.discord.webhook_url = val;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.chat.channel = self
            .chat
            .channel
            .trim()
            .trim_start_matches('#')
            .to_lowercase();

        if self.chat.channel.is_empty() {
            anyhow::bail!("chat.channel is required (set in config.toml or TWITCH_CHANNEL env var)");
        }
        if self.chat.oauth_token.trim().is_empty() {
            anyhow::bail!(
                "chat.oauth_token is required (set in config.toml or TWITCH_OAUTH_TOKEN env var)"
            );
        }
        if self.twitch.client_id.trim().is_empty() {
            anyhow::bail!(
                "twitch.client_id is required (set in config.toml or TWITCH_CLIENT_ID env var)"
            );
        }
        if self.discord.webhook_url.trim().is_empty() {
            anyhow::bail!(
                "discord.webhook_url is required (set in config.toml or DISCORD_WEBHOOK_URL env var)"
            );
        }
        if self.clips.trigger.trim().is_empty() {
            anyhow::bail!("clips.trigger must not be empty");
        }
        if !(5..=60).contains(&self.clips.duration_secs) {
            anyhow::bail!(
                "clips.duration_secs (CLIP_DURATION_SECS) must be between 5 and 60, got: {}",
                self.clips.duration_secs
            );
        }
        if self.chat.username.as_deref().is_some_and(|u| u.trim().is_empty()) {
            self.chat.username = None;
        }

        Ok(())
    }

    /// Login sent with NICK
    pub fn nick(&self) -> String {
        self.chat
            .username
            .clone()
            .unwrap_or_else(|| self.chat.channel.clone())
            .to_lowercase()
    }

    /// Chat PASS value, always carrying the `oauth:` prefix
    pub fn chat_password(&self) -> String {
        let token = self.chat.oauth_token.trim();
        if token.starts_with("oauth:") {
            token.to_string()
        } else {
            format!("oauth:{}", token)
        }
    }

    /// API bearer token, never carrying the `oauth:` prefix
    pub fn api_token(&self) -> String {
        let token = self
            .twitch
            .access_token
            .as_deref()
            .unwrap_or(&self.chat.oauth_token)
            .trim();
        token.strip_prefix("oauth:").unwrap_or(token).to_string()
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.chat.reconnect_delay_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.clips.cooldown_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.twitch.http_timeout_secs.max(1))
    }
}

fn parse_secs(name: &str, val: &str) -> Result<u64> {
    val.trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got: {}", name, val))
}
