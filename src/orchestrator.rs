// ABOUTME: Clip workflow: resolve broadcaster, create clip, acknowledge in chat, notify Discord
// ABOUTME: ClipBot glues recognizer and cooldown gate to fire-and-forget workers on the tokio runtime

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;

use crate::commands::{CommandRecognizer, TriggerEvent};
use crate::config::Config;
use crate::cooldown::{remaining_secs, Admission, CooldownGate, CooldownMode};
use crate::error::ClipError;
use crate::helix::{clip_url, ClipDetails, HelixClient};
use crate::irc::ChatMessage;
use crate::notifier::{build_clip_payload, ClipAnnouncement, Notifier};
use crate::transport::{ChatSender, LineHandler};

const FALLBACK_TITLE: &str = "Clip created";

/// A freshly created clip; lives for one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipResult {
    pub id: String,
    pub url: String,
    pub broadcaster_name: String,
    pub creator: Option<String>,
    pub creator_avatar_url: Option<String>,
}

/// Avatar lookup outcome; always carries a usable URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub url: String,
    pub is_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct ClipSettings {
    pub broadcaster_login: String,
    /// Seconds of stream captured into each clip
    pub clip_duration_secs: u64,
    pub clip_base_url: String,
    pub fallback_avatar_url: String,
    pub footer_text: String,
    pub footer_icon_url: String,
}

impl ClipSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            broadcaster_login: config.chat.channel.clone(),
            clip_duration_secs: config.clips.duration_secs,
            clip_base_url: config.clips.base_url.clone(),
            fallback_avatar_url: config.discord.fallback_avatar_url.clone(),
            footer_text: config.discord.footer_text.clone(),
            footer_icon_url: config.discord.footer_icon_url.clone(),
        }
    }
}

pub fn acknowledgement(invoker: &str, title: Option<&str>, url: &str) -> String {
    format!("📸 @{} {}: {}", invoker, title.unwrap_or(FALLBACK_TITLE), url)
}

pub fn failure_message(invoker: &str) -> String {
    format!("❌ @{} could not create the clip. Try again later.", invoker)
}

pub fn cooldown_message(invoker: &str, remaining_secs: u64) -> String {
    format!(
        "⏳ @{} clips are on cooldown, try again in {}s.",
        invoker, remaining_secs
    )
}

pub struct ClipOrchestrator {
    helix: HelixClient,
    notifier: Notifier,
    sender: ChatSender,
    gate: Arc<CooldownGate>,
    settings: ClipSettings,
}

impl ClipOrchestrator {
    pub fn new(
        helix: HelixClient,
        notifier: Notifier,
        sender: ChatSender,
        gate: Arc<CooldownGate>,
        settings: ClipSettings,
    ) -> Self {
        Self {
            helix,
            notifier,
            sender,
            gate,
            settings,
        }
    }

    pub fn from_config(config: &Config, sender: ChatSender) -> anyhow::Result<Self> {
        let helix = HelixClient::new(
            &config.twitch.api_base,
            &config.twitch.client_id,
            &config.api_token(),
            config.http_timeout(),
        )?;
        let notifier = Notifier::new(&config.discord.webhook_url, config.http_timeout())?;
        let gate = Arc::new(CooldownGate::new(
            config.cooldown(),
            config.clips.cooldown_mode,
        ));
        Ok(Self::new(
            helix,
            notifier,
            sender,
            gate,
            ClipSettings::from_config(config),
        ))
    }

    pub fn gate(&self) -> &Arc<CooldownGate> {
        &self.gate
    }

    pub fn sender(&self) -> &ChatSender {
        &self.sender
    }

    /// Resolve the broadcaster and create a clip on their stream
    pub async fn create_clip(&self) -> Result<ClipResult, ClipError> {
        let login = &self.settings.broadcaster_login;
        let broadcaster = self
            .helix
            .get_user(login)
            .await?
            .ok_or_else(|| ClipError::BroadcasterNotFound {
                login: login.clone(),
            })?;

        tracing::info!(
            broadcaster = %broadcaster.display_name,
            broadcaster_id = %broadcaster.id,
            "Creating clip"
        );

        let created = self
            .helix
            .create_clip(&broadcaster.id, self.settings.clip_duration_secs)
            .await?;
        let url = clip_url(&self.settings.clip_base_url, &created.id);
        tracing::info!(clip_id = %created.id, url = %url, "Clip created");

        Ok(ClipResult {
            id: created.id,
            url,
            broadcaster_name: broadcaster.display_name,
            creator: None,
            creator_avatar_url: None,
        })
    }

    /// Best-effort profile image; any failure yields the configured fallback image
    pub async fn get_user_avatar(&self, identity: &str) -> Avatar {
        match self.helix.get_user(identity).await {
            Ok(Some(user)) if !user.profile_image_url.trim().is_empty() => Avatar {
                url: user.profile_image_url,
                is_fallback: false,
            },
            Ok(_) => {
                tracing::debug!(user = %identity, "No profile image, using fallback avatar");
                self.fallback_avatar()
            }
            Err(e) => {
                tracing::warn!(
                    user = %identity,
                    kind = e.kind(),
                    error = %e,
                    "Avatar lookup failed, using fallback avatar"
                );
                self.fallback_avatar()
            }
        }
    }

    fn fallback_avatar(&self) -> Avatar {
        Avatar {
            url: self.settings.fallback_avatar_url.clone(),
            is_fallback: true,
        }
    }

    async fn clip_details(&self, clip_id: &str) -> Option<ClipDetails> {
        match self.helix.get_clip(clip_id).await {
            Ok(Some(details)) => Some(details),
            Ok(None) => {
                tracing::debug!(clip_id, "Clip details not available yet");
                None
            }
            Err(e) => {
                tracing::warn!(clip_id, kind = e.kind(), error = %e, "Failed to fetch clip details");
                None
            }
        }
    }

    /// Run one admitted trigger on its own task; the caller never waits for it
    pub fn dispatch(
        self: &Arc<Self>,
        event: TriggerEvent,
        admitted_at: Instant,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            // Failures are logged and answered in chat inside the workflow
            let _ = orchestrator.run_workflow(&event, admitted_at).await;
        })
    }

    /// create → acknowledge → enrich → notify, strictly in that order.
    ///
    /// `admitted_at` is when the gate let the trigger through; a successful clip
    /// starts the cooldown window from that instant.
    pub async fn run_workflow(
        &self,
        event: &TriggerEvent,
        admitted_at: Instant,
    ) -> Result<ClipResult, ClipError> {
        let mut clip = match self.create_clip().await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::error!(
                    invoker = %event.invoker,
                    kind = e.kind(),
                    error = %e,
                    "Clip creation failed"
                );
                let _ = self
                    .sender
                    .send_chat_message(&failure_message(&event.invoker))
                    .await;
                return Err(e);
            }
        };

        if self.gate.mode() == CooldownMode::OnSuccess {
            self.gate.record(admitted_at);
        }

        let ack = acknowledgement(&event.invoker, event.title(), &clip.url);
        if let Err(e) = self.sender.send_chat_message(&ack).await {
            tracing::warn!(error = %e, clip_id = %clip.id, "Chat acknowledgement not sent");
        }

        let avatar = self.get_user_avatar(&event.invoker).await;
        clip.creator = Some(event.invoker.clone());
        clip.creator_avatar_url = Some(avatar.url);

        let details = self.clip_details(&clip.id).await;
        let payload = build_clip_payload(&ClipAnnouncement {
            clip_id: &clip.id,
            clip_url: &clip.url,
            broadcaster: &clip.broadcaster_name,
            title: event.title(),
            creator: clip.creator.as_deref(),
            creator_avatar_url: clip
                .creator_avatar_url
                .as_deref()
                .unwrap_or(&self.settings.fallback_avatar_url),
            details: details.as_ref(),
            footer_text: &self.settings.footer_text,
            footer_icon_url: &self.settings.footer_icon_url,
            now: Utc::now(),
        });

        if !self.notifier.notify(&payload).await.is_delivered() {
            tracing::warn!(clip_id = %clip.id, "Clip created but Discord was not notified");
        }

        Ok(clip)
    }
}

/// Line handler wired into the chat session's read loop
pub struct ClipBot {
    recognizer: CommandRecognizer,
    orchestrator: Arc<ClipOrchestrator>,
}

impl ClipBot {
    pub fn new(recognizer: CommandRecognizer, orchestrator: Arc<ClipOrchestrator>) -> Self {
        Self {
            recognizer,
            orchestrator,
        }
    }

    /// Gate a trigger and spawn its worker; `None` when nothing was dispatched.
    /// Only the first rejected trigger of a window is answered in chat.
    pub async fn handle_trigger(&self, event: TriggerEvent) -> Option<JoinHandle<()>> {
        tracing::info!(
            invoker = %event.invoker,
            argument = %event.argument,
            "Clip command received"
        );

        let now = Instant::now();
        match self.orchestrator.gate().admit(now) {
            Admission::Admitted => Some(self.orchestrator.dispatch(event, now)),
            Admission::Rejected { remaining, notify } => {
                let secs = remaining_secs(remaining);
                tracing::info!(invoker = %event.invoker, remaining_secs = secs, "Clip command on cooldown");
                if !notify {
                    return None;
                }
                let _ = self
                    .orchestrator
                    .sender()
                    .send_chat_message(&cooldown_message(&event.invoker, secs))
                    .await;
                None
            }
        }
    }
}

#[async_trait]
impl LineHandler for ClipBot {
    async fn on_chat_message(&self, message: ChatMessage) {
        if let Some(event) = self.recognizer.recognize(&message) {
            self.handle_trigger(event).await;
        }
    }
}
