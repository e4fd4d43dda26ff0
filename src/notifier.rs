// ABOUTME: Discord webhook notifier for newly created clips
// ABOUTME: Builds the embed document and delivers it once, reporting a typed outcome instead of failing

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::NotifyError;
use crate::helix::ClipDetails;

/// Twitch brand purple
pub const EMBED_COLOR: u32 = 0x9146FF;

const DEFAULT_TITLE: &str = "New clip created!";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: String,
}

/// Everything the embed needs about one clip
#[derive(Debug, Clone)]
pub struct ClipAnnouncement<'a> {
    pub clip_id: &'a str,
    pub clip_url: &'a str,
    pub broadcaster: &'a str,
    pub title: Option<&'a str>,
    pub creator: Option<&'a str>,
    pub creator_avatar_url: &'a str,
    pub details: Option<&'a ClipDetails>,
    pub footer_text: &'a str,
    pub footer_icon_url: &'a str,
    pub now: DateTime<Utc>,
}

/// Build the embed document for a new clip; optional fields appear only when their data exists
pub fn build_clip_payload(announcement: &ClipAnnouncement<'_>) -> WebhookPayload {
    let ClipAnnouncement {
        clip_id,
        clip_url,
        broadcaster,
        title,
        creator,
        creator_avatar_url,
        details,
        footer_text,
        footer_icon_url,
        now,
    } = announcement;

    // The invoker's argument wins, then the title Twitch gave the clip
    let title = title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            details
                .and_then(|d| d.title.as_deref())
                .filter(|t| !t.trim().is_empty())
        });
    let title = match title {
        Some(title) => format!("🎬 {}", title.trim()),
        None => format!("🎬 {}", DEFAULT_TITLE),
    };

    let mut fields = vec![
        EmbedField::inline("🔗 Clip link", format!("[Watch clip]({})", clip_url)),
        EmbedField::inline("✏️ Edit clip", format!("[Edit]({}/edit)", clip_url)),
    ];

    if let Some(details) = details {
        if let Some(duration) = details.duration.filter(|d| *d > 0.0) {
            fields.push(EmbedField::inline(
                "⏱️ Duration",
                format!("{} seconds", format_duration(duration)),
            ));
        }
        if let Some(views) = details.view_count {
            fields.push(EmbedField::inline("👀 Views", views.to_string()));
        }
    }

    if let Some(creator) = creator {
        fields.push(EmbedField::inline("👤 Created by", creator.to_string()));
    }

    if let Some(created) = details
        .and_then(|d| d.created_at.as_deref())
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    {
        fields.push(EmbedField::inline(
            "📅 Created",
            created.with_timezone(&Utc).format("%d/%m/%Y %H:%M UTC").to_string(),
        ));
    }

    fields.push(EmbedField::inline("🆔 Clip ID", format!("`{}`", clip_id)));

    let image = details
        .and_then(|d| d.thumbnail_url.as_deref())
        .filter(|url| !url.is_empty())
        .map(|url| EmbedImage {
            url: url.to_string(),
        });

    WebhookPayload {
        embeds: vec![Embed {
            title,
            description: format!("New clip created on **{}**", broadcaster),
            url: Some(clip_url.to_string()),
            color: EMBED_COLOR,
            fields,
            thumbnail: Some(EmbedImage {
                url: creator_avatar_url.to_string(),
            }),
            image,
            footer: EmbedFooter {
                text: footer_text.to_string(),
                icon_url: footer_icon_url.to_string(),
            },
            timestamp: Some(now.to_rfc3339()),
        }],
    }
}

fn format_duration(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{:.1}", secs)
    }
}

/// Result of one delivery attempt; failures are already logged
#[must_use]
#[derive(Debug)]
pub enum Delivery {
    Delivered,
    Failed(NotifyError),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(webhook_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create webhook http client")?;
        Ok(Self {
            http,
            webhook_url: webhook_url.trim().to_string(),
        })
    }

    /// POST the payload once. Never retried; any 2xx counts as delivered.
    pub async fn notify(&self, payload: &WebhookPayload) -> Delivery {
        match self.try_notify(payload).await {
            Ok(()) => {
                tracing::info!("Clip notification delivered");
                Delivery::Delivered
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to deliver clip notification");
                Delivery::Failed(e)
            }
        }
    }

    async fn try_notify(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        let response = self.http.post(&self.webhook_url).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected { status, body })
    }
}
