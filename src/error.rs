// ABOUTME: Typed failures for the chat transport, the clip workflow and webhook delivery
// ABOUTME: ClipError carries a stable classification label used in structured logs

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to chat")]
    NotConnected,
    #[error("chat connection closed by server")]
    Closed,
    #[error("server requested reconnect")]
    ReconnectRequested,
    #[error("chat I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("broadcaster '{login}' not found")]
    BroadcasterNotFound { login: String },
    /// Expired or invalid credentials
    #[error("clip API rejected credentials (401): {body}")]
    Unauthorized { body: String },
    #[error("channel is not live: {body}")]
    ChannelNotLive { body: String },
    #[error("clip API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("clip API request timed out")]
    Timeout,
    #[error("clip API returned no clip data")]
    MissingData,
    #[error("clip API request failed: {0}")]
    Http(reqwest::Error),
}

impl ClipError {
    /// Short label for the `kind` log field
    pub fn kind(&self) -> &'static str {
        match self {
            ClipError::BroadcasterNotFound { .. } => "broadcaster_not_found",
            ClipError::Unauthorized { .. } => "api_unauthorized",
            ClipError::ChannelNotLive { .. } => "api_channel_not_live",
            ClipError::Api { .. } | ClipError::MissingData | ClipError::Http(_) => {
                "api_generic_error"
            }
            ClipError::Timeout => "api_timeout",
        }
    }

    /// Map a non-success response onto the taxonomy
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return ClipError::Unauthorized { body };
        }
        ClipError::Api { status, body }
    }

    /// Narrow a create-clip failure: Twitch answers 404 or an "offline" message when
    /// the broadcaster is not streaming
    pub fn for_clip_creation(self) -> Self {
        match self {
            ClipError::Api { status, body }
                if status == StatusCode::NOT_FOUND || mentions_offline(&body) =>
            {
                ClipError::ChannelNotLive { body }
            }
            other => other,
        }
    }
}

fn mentions_offline(body: &str) -> bool {
    let lowered = body.to_lowercase();
    lowered.contains("offline") || lowered.contains("not live")
}

impl From<reqwest::Error> for ClipError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClipError::Timeout
        } else {
            ClipError::Http(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook returned {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("webhook request timed out")]
    Timeout,
    #[error("webhook request failed: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NotifyError::Timeout
        } else {
            NotifyError::Http(err)
        }
    }
}
