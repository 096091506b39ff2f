//! Dify chat-messages API client (blocking response mode only).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sends one user utterance to the conversational backend, optionally
/// continuing an existing conversation. Implemented by [`DifyClient`].
#[async_trait]
pub trait ConversationClient: Send + Sync {
    async fn send(
        &self,
        query: &str,
        user: &str,
        conversation_id: Option<&str>,
    ) -> Result<ConversationReply, DifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DifyError {
    #[error("dify request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("dify api error: {0}")]
    Api(String),
}

/// Backend reply: answer text and the conversation id to continue with.
/// Either may be absent on odd payloads; the orchestrator falls back.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationReply {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessagesRequest<'a> {
    app_id: &'a str,
    inputs: serde_json::Value,
    query: &'a str,
    response_mode: &'a str,
    user: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

/// Client for the Dify chat-messages HTTP API.
#[derive(Clone)]
pub struct DifyClient {
    api_base: String,
    api_key: String,
    app_id: String,
    client: reqwest::Client,
}

impl DifyClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            api_base,
            api_key: api_key.into(),
            app_id: app_id.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ConversationClient for DifyClient {
    /// POST /chat-messages — blocking mode; conversation_id is omitted entirely
    /// when None so the backend mints a new conversation.
    async fn send(
        &self,
        query: &str,
        user: &str,
        conversation_id: Option<&str>,
    ) -> Result<ConversationReply, DifyError> {
        let url = format!("{}/chat-messages", self.api_base);
        let body = ChatMessagesRequest {
            app_id: &self.app_id,
            inputs: serde_json::json!({}),
            query,
            response_mode: "blocking",
            user,
            conversation_id,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DifyError::Api(format!("{} {}", status, body)));
        }
        let data: ConversationReply = res.json().await?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_omits_absent_conversation_id() {
        let body = ChatMessagesRequest {
            app_id: "app-1",
            inputs: serde_json::json!({}),
            query: "hello",
            response_mode: "blocking",
            user: "slack_user",
            conversation_id: None,
        };
        let v = serde_json::to_value(&body).expect("serialize");
        assert!(v.get("conversation_id").is_none());
        assert_eq!(v["response_mode"], "blocking");

        let body = ChatMessagesRequest {
            conversation_id: Some("S1"),
            ..body
        };
        let v = serde_json::to_value(&body).expect("serialize");
        assert_eq!(v["conversation_id"], "S1");
    }
}
