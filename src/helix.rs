// ABOUTME: HTTP client for the Twitch Helix user and clip endpoints
// ABOUTME: Sends bearer + Client-Id headers and classifies non-success responses into ClipError

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ClipError;

#[derive(Debug, Clone, Deserialize)]
struct DataResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedClip {
    pub id: String,
}

/// Metadata returned by `GET /clips?id=...`, usually available shortly after creation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClipDetails {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone)]
pub struct HelixClient {
    http: reqwest::Client,
    api_base: String,
    client_id: String,
    access_token: String,
}

impl HelixClient {
    pub fn new(
        api_base: &str,
        client_id: &str,
        access_token: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lore-clipper/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create helix http client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id: client_id.trim().to_string(),
            access_token: access_token.trim().to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(&self.access_token)
            .header("Client-Id", &self.client_id)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, ClipError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipError::from_status(status, body));
        }
        let parsed: DataResponse<T> = response.json().await?;
        Ok(parsed.data)
    }

    /// Look up a user by login; `Ok(None)` when the login does not exist
    pub async fn get_user(&self, login: &str) -> Result<Option<HelixUser>, ClipError> {
        let request = self
            .request(reqwest::Method::GET, "/users")
            .query(&[("login", login)]);
        let users: Vec<HelixUser> = self.send_json(request).await?;
        Ok(users.into_iter().next())
    }

    /// Ask Twitch to capture the last `duration_secs` of the broadcaster's live stream
    pub async fn create_clip(
        &self,
        broadcaster_id: &str,
        duration_secs: u64,
    ) -> Result<CreatedClip, ClipError> {
        let duration = duration_secs.to_string();
        let request = self
            .request(reqwest::Method::POST, "/clips")
            .query(&[("broadcaster_id", broadcaster_id), ("duration", duration.as_str())]);
        let clips: Vec<CreatedClip> = self
            .send_json(request)
            .await
            .map_err(ClipError::for_clip_creation)?;
        clips
            .into_iter()
            .next()
            .filter(|clip| !clip.id.trim().is_empty())
            .ok_or(ClipError::MissingData)
    }

    pub async fn get_clip(&self, clip_id: &str) -> Result<Option<ClipDetails>, ClipError> {
        let request = self
            .request(reqwest::Method::GET, "/clips")
            .query(&[("id", clip_id)]);
        let clips: Vec<ClipDetails> = self.send_json(request).await?;
        Ok(clips.into_iter().next())
    }
}

/// Public URL for a clip id; no other transformation is applied
pub fn clip_url(base_url: &str, clip_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), clip_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> HelixClient {
        HelixClient::new(
            &server.base_url(),
            "client-123",
            "token-abc",
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[test]
    fn test_clip_url_is_host_slash_id() {
        assert_eq!(
            clip_url("https://clips.twitch.tv", "AwkwardHelplessSalamanderSwiftRage"),
            "https://clips.twitch.tv/AwkwardHelplessSalamanderSwiftRage"
        );
        assert_eq!(clip_url("https://clips.twitch.tv/", "abc"), "https://clips.twitch.tv/abc");
    }

    #[tokio::test]
    async fn test_get_user_sends_auth_headers() {
        let server = MockServer::start();
        let users = server.mock(|when, then| {
            when.method(GET)
                .path("/users")
                .query_param("login", "lorestream")
                .header("authorization", "Bearer token-abc")
                .header("client-id", "client-123");
            then.status(200).json_body(json!({
                "data": [{
                    "id": "42",
                    "login": "lorestream",
                    "display_name": "LoreStream",
                    "profile_image_url": "https://cdn.test/lore.png"
                }]
            }));
        });

        let user = client(&server).get_user("lorestream").await.unwrap().unwrap();
        assert_eq!(user.id, "42");
        assert_eq!(user.display_name, "LoreStream");
        assert_eq!(users.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_user_missing_returns_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users");
            then.status(200).json_body(json!({ "data": [] }));
        });

        let user = client(&server).get_user("ghost").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_create_clip_accepts_202() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/clips")
                .query_param("broadcaster_id", "42")
                .query_param("duration", "60");
            then.status(202).json_body(json!({
                "data": [{ "id": "FunnyClip", "edit_url": "https://clips.twitch.tv/FunnyClip/edit" }]
            }));
        });

        let clip = client(&server).create_clip("42", 60).await.unwrap();
        assert_eq!(clip.id, "FunnyClip");
        assert_eq!(create.calls(), 1);
    }

    #[tokio::test]
    async fn test_create_clip_classifies_unauthorized() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/clips");
            then.status(401)
                .body(r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#);
        });

        let err = client(&server).create_clip("42", 60).await.unwrap_err();
        assert!(matches!(err, ClipError::Unauthorized { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_create_clip_empty_data_is_missing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/clips");
            then.status(202).json_body(json!({ "data": [] }));
        });

        let err = client(&server).create_clip("42", 60).await.unwrap_err();
        assert!(matches!(err, ClipError::MissingData));
    }

    #[tokio::test]
    async fn test_get_clip_details() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/clips").query_param("id", "FunnyClip");
            then.status(200).json_body(json!({
                "data": [{
                    "id": "FunnyClip",
                    "title": "stream title",
                    "thumbnail_url": "https://cdn.test/thumb.jpg",
                    "duration": 30.0,
                    "view_count": 0,
                    "created_at": "2024-05-01T18:30:00Z"
                }]
            }));
        });

        let details = client(&server).get_clip("FunnyClip").await.unwrap().unwrap();
        assert_eq!(details.title.as_deref(), Some("stream title"));
        assert_eq!(details.view_count, Some(0));
        assert_eq!(details.duration, Some(30.0));
        assert_eq!(details.thumbnail_url.as_deref(), Some("https://cdn.test/thumb.jpg"));
    }

    #[tokio::test]
    async fn test_create_clip_offline_is_not_live() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/clips");
            then.status(404)
                .body(r#"{"error":"Not Found","status":404,"message":"Clipping is not possible for an offline channel."}"#);
        });

        let err = client(&server).create_clip("42", 60).await.unwrap_err();
        assert_eq!(err.kind(), "api_channel_not_live");
    }

    #[tokio::test]
    async fn test_get_user_not_found_is_generic_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users");
            then.status(404).body("offline");
        });

        let err = client(&server).get_user("ghost").await.unwrap_err();
        assert_eq!(err.kind(), "api_generic_error");
    }
}
