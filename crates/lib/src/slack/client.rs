//! Slack Web API client: chat.postMessage and chat.update.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Posts and overwrites thread messages. Implemented by [`SlackClient`];
/// test doubles record calls instead of hitting the network.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message into a thread; returns the new message's ts.
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<String, SlackError>;

    /// Overwrite an existing message identified by ts.
    async fn update_message(&self, channel: &str, ts: &str, text: &str)
        -> Result<(), SlackError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack api error: {0}")]
    Api(String),
}

/// Web API responses carry `ok` plus either the payload or an `error` code.
#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the Slack Web API (bearer bot token).
#[derive(Clone)]
pub struct SlackClient {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            api_base,
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<ChatMessageResponse, SlackError> {
        let url = format!("{}/{}", self.api_base, method);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{} {} {}", method, status, body)));
        }
        let data: ChatMessageResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::Api(format!(
                "{} failed: {}",
                method,
                data.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        Ok(data)
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<String, SlackError> {
        let body = json!({ "channel": channel, "thread_ts": thread_ts, "text": text });
        let data = self.call("chat.postMessage", body).await?;
        data.ts
            .ok_or_else(|| SlackError::Api("chat.postMessage response missing ts".to_string()))
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), SlackError> {
        let body = json!({ "channel": channel, "ts": ts, "text": text });
        self.call("chat.update", body).await?;
        Ok(())
    }
}
