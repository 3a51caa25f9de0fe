//! Discord REST implementation of the `ChatPlatform` contract.
//!
//! Each primitive maps onto one REST endpoint with a bounded timeout and
//! structured failure classification: 429 and 5xx responses are retryable,
//! 404 surfaces as `ActionError::NotFound`, everything else is terminal.

use chrono::DateTime;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::{
    ActionError, ChannelId, ChatPlatform, EmbedSpec, MessageId, OutboundMessage, RoleId,
    ScheduledEventId, ScheduledEventSpec, ThreadSpec, ThreadSummary, UserId,
};

const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
const EXTERNAL_EVENT_ENTITY_TYPE: u8 = 3;
const GUILD_ONLY_PRIVACY_LEVEL: u8 = 2;

#[derive(Debug, Clone)]
pub struct DiscordRestConfig {
    pub api_base: String,
    pub bot_token: String,
    pub guild_id: u64,
    pub http_timeout_ms: u64,
}

impl DiscordRestConfig {
    pub fn new(bot_token: impl Into<String>, guild_id: u64) -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            bot_token: bot_token.into(),
            guild_id,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

#[derive(Debug)]
pub struct DiscordRestClient {
    config: DiscordRestConfig,
    client: reqwest::Client,
}

impl DiscordRestClient {
    pub fn new(config: DiscordRestConfig) -> Result<Self, ActionError> {
        if config.bot_token.trim().is_empty() {
            return Err(ActionError::terminal(
                "client_missing_bot_token",
                "Discord REST client requires a non-empty bot token",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.http_timeout_ms))
            .build()
            .map_err(|error| {
                ActionError::terminal("client_build_failed", error.to_string())
            })?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: String,
        body: Option<Value>,
    ) -> Result<Value, ActionError> {
        let mut request = self
            .client
            .request(method, &endpoint)
            .header("Authorization", format!("Bot {}", self.config.bot_token));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|error| {
            ActionError::retryable("delivery_transport_error", error.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ActionError::NotFound);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let (reason_code, retryable) = classify_status(status);
            return Err(ActionError::Failed {
                reason_code: reason_code.to_string(),
                retryable,
                detail: format!("HTTP {} from {endpoint}: {detail}", status.as_u16()),
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let raw = response.text().await.unwrap_or_default();
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&raw).map_err(|error| {
            ActionError::terminal(
                "delivery_response_decode_failed",
                format!("invalid JSON from {endpoint}: {error}"),
            )
        })
    }

    /// Discord sets a thread's starter message id equal to the thread id.
    async fn starter_message(&self, thread: ChannelId) -> String {
        let endpoint = self.endpoint(&format!("/channels/{thread}/messages/{thread}"));
        match self.execute(Method::GET, endpoint, None).await {
            Ok(value) => value
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Err(error) => {
                tracing::debug!(thread = %thread, error = %error, "starter message fetch failed");
                String::new()
            }
        }
    }
}

fn classify_status(status: StatusCode) -> (&'static str, bool) {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ("delivery_rate_limited", true);
    }
    if status.is_server_error() {
        return ("delivery_provider_unavailable", true);
    }
    ("delivery_rejected", false)
}

fn parse_snowflake(value: &Value, field: &str, endpoint: &str) -> Result<u64, ActionError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<u64>().ok())
        .ok_or_else(|| {
            ActionError::terminal(
                "delivery_response_decode_failed",
                format!("missing or invalid '{field}' in response from {endpoint}"),
            )
        })
}

fn embed_to_json(embed: &EmbedSpec) -> Value {
    let mut object = json!({ "description": embed.description });
    if let Some(title) = &embed.title {
        object["title"] = json!(title);
    }
    if let Some(url) = &embed.url {
        object["url"] = json!(url);
    }
    if let Some(color) = embed.color {
        object["color"] = json!(color);
    }
    if let Some(image_url) = &embed.image_url {
        object["image"] = json!({ "url": image_url });
    }
    if embed.author_name.is_some() {
        let mut author = json!({ "name": embed.author_name });
        if let Some(author_url) = &embed.author_url {
            author["url"] = json!(author_url);
        }
        if let Some(icon_url) = &embed.author_icon_url {
            author["icon_url"] = json!(icon_url);
        }
        object["author"] = author;
    }
    if let Some(timestamp_unix) = embed.timestamp_unix {
        if let Some(timestamp) = DateTime::from_timestamp(timestamp_unix, 0) {
            object["timestamp"] = json!(timestamp.to_rfc3339());
        }
    }
    object
}

fn unix_to_rfc3339(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|value| value.to_rfc3339())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl ChatPlatform for DiscordRestClient {
    async fn post_message(&self, message: &OutboundMessage) -> Result<MessageId, ActionError> {
        let endpoint = self.endpoint(&format!("/channels/{}/messages", message.channel));
        let mut body = json!({});
        if let Some(content) = &message.content {
            body["content"] = json!(content);
        }
        if let Some(embed) = &message.embed {
            body["embeds"] = json!([embed_to_json(embed)]);
        }
        let response = self.execute(Method::POST, endpoint.clone(), Some(body)).await?;
        Ok(MessageId(parse_snowflake(&response, "id", &endpoint)?))
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), ActionError> {
        let endpoint = self.endpoint(&format!("/channels/{channel}/messages/{message}"));
        self.execute(Method::DELETE, endpoint, None).await.map(|_| ())
    }

    async fn create_thread(&self, spec: &ThreadSpec) -> Result<ChannelId, ActionError> {
        let endpoint = self.endpoint(&format!("/channels/{}/threads", spec.channel));
        let body = json!({
            "name": spec.title,
            "auto_archive_duration": spec.auto_archive_minutes,
            "message": { "content": spec.message },
        });
        let response = self.execute(Method::POST, endpoint.clone(), Some(body)).await?;
        Ok(ChannelId(parse_snowflake(&response, "id", &endpoint)?))
    }

    async fn list_threads(&self, channel: ChannelId) -> Result<Vec<ThreadSummary>, ActionError> {
        let endpoint = self.endpoint(&format!(
            "/guilds/{}/threads/active",
            self.config.guild_id
        ));
        let response = self.execute(Method::GET, endpoint, None).await?;
        let threads = response
            .get("threads")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let parent = channel.to_string();
        let mut summaries = Vec::new();
        for thread in threads {
            let parent_id = thread
                .get("parent_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if parent_id != parent {
                continue;
            }
            let id = thread
                .get("id")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<u64>().ok());
            let title = thread
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let Some(id) = id else { continue };
            let message = self.starter_message(ChannelId(id)).await;
            summaries.push(ThreadSummary {
                id: ChannelId(id),
                title,
                message,
            });
        }
        Ok(summaries)
    }

    async fn create_scheduled_event(
        &self,
        spec: &ScheduledEventSpec,
    ) -> Result<ScheduledEventId, ActionError> {
        let endpoint = self.endpoint(&format!(
            "/guilds/{}/scheduled-events",
            self.config.guild_id
        ));
        let body = json!({
            "name": spec.name,
            "description": spec.description,
            "scheduled_start_time": unix_to_rfc3339(spec.start_unix),
            "scheduled_end_time": unix_to_rfc3339(spec.end_unix),
            "entity_type": EXTERNAL_EVENT_ENTITY_TYPE,
            "entity_metadata": { "location": spec.location },
            "privacy_level": GUILD_ONLY_PRIVACY_LEVEL,
        });
        let response = self.execute(Method::POST, endpoint.clone(), Some(body)).await?;
        Ok(ScheduledEventId(parse_snowflake(&response, "id", &endpoint)?))
    }

    async fn list_scheduled_event_names(&self) -> Result<Vec<String>, ActionError> {
        let endpoint = self.endpoint(&format!(
            "/guilds/{}/scheduled-events",
            self.config.guild_id
        ));
        let response = self.execute(Method::GET, endpoint, None).await?;
        let names = response
            .as_array()
            .map(|events| {
                events
                    .iter()
                    .filter_map(|event| event.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<(), ActionError> {
        let endpoint = self.endpoint(&format!(
            "/guilds/{}/members/{user}/roles/{role}",
            self.config.guild_id
        ));
        self.execute(Method::PUT, endpoint, None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn client_for(server: &MockServer) -> DiscordRestClient {
        let config = DiscordRestConfig {
            api_base: server.base_url(),
            bot_token: "test-token".to_string(),
            guild_id: 900,
            http_timeout_ms: 2_000,
        };
        DiscordRestClient::new(config).expect("client")
    }

    #[tokio::test]
    async fn functional_post_message_sends_embed_payload_and_parses_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/channels/42/messages")
                    .header("authorization", "Bot test-token")
                    .json_body_obj(&serde_json::json!({
                        "content": "<@&7> ",
                        "embeds": [{
                            "title": "New Post",
                            "description": "hello",
                        }],
                    }));
                then.status(200).json_body(serde_json::json!({ "id": "555" }));
            })
            .await;

        let client = client_for(&server);
        let message = OutboundMessage::embed(
            ChannelId(42),
            EmbedSpec {
                title: Some("New Post".to_string()),
                description: "hello".to_string(),
                ..EmbedSpec::default()
            },
        )
        .with_content("<@&7> ");
        let id = client.post_message(&message).await.expect("post");
        assert_eq!(id, MessageId(555));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unit_delete_message_maps_404_to_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/channels/42/messages/555");
                then.status(404);
            })
            .await;

        let client = client_for(&server);
        let error = client
            .delete_message(ChannelId(42), MessageId(555))
            .await
            .expect_err("deleted message should be gone");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn unit_rate_limited_and_server_errors_are_retryable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/guilds/900/members/1/roles/2");
                then.status(429);
            })
            .await;

        let client = client_for(&server);
        let error = client
            .grant_role(UserId(1), RoleId(2))
            .await
            .expect_err("rate limited");
        assert!(error.is_retryable());
        assert_eq!(error.reason_code(), "delivery_rate_limited");
    }

    #[tokio::test]
    async fn functional_list_threads_filters_by_parent_and_reads_starters() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/guilds/900/threads/active");
                then.status(200).json_body(serde_json::json!({
                    "threads": [
                        { "id": "10", "parent_id": "42", "name": "06 June 2025" },
                        { "id": "11", "parent_id": "99", "name": "other forum" },
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/channels/10/messages/10");
                then.status(200)
                    .json_body(serde_json::json!({ "content": "Sigrid at Oslo Spektrum, Oslo, Norway" }));
            })
            .await;

        let client = client_for(&server);
        let threads = client.list_threads(ChannelId(42)).await.expect("list");
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].title, "06 June 2025");
        assert!(threads[0].message.contains("Oslo Spektrum"));
    }

    #[tokio::test]
    async fn functional_create_scheduled_event_posts_external_entity() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/guilds/900/scheduled-events")
                    .json_body_includes(r#"{ "entity_type": 3, "privacy_level": 2 }"#);
                then.status(200).json_body(serde_json::json!({ "id": "77" }));
            })
            .await;

        let client = client_for(&server);
        let spec = ScheduledEventSpec {
            name: "06 June 2025 - Oslo Spektrum".to_string(),
            description: "Sigrid at Oslo Spektrum".to_string(),
            location: "Oslo Spektrum, Oslo, Norway".to_string(),
            start_unix: 1_780_000_000,
            end_unix: 1_780_014_400,
        };
        let id = client.create_scheduled_event(&spec).await.expect("create");
        assert_eq!(id, ScheduledEventId(77));
        mock.assert_async().await;
    }
}
