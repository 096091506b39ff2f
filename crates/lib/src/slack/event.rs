//! Slack Events-API wire types (webhook POST body).

use serde::Deserialize;

/// Outer envelope of an Events-API delivery. `type` is "url_verification"
/// during endpoint setup and "event_callback" for normal deliveries.
#[derive(Debug, Deserialize)]
pub struct SlackEnvelope {
    #[serde(rename = "type", default)]
    pub typ: Option<String>,
    /// Present only on url_verification.
    #[serde(default)]
    pub challenge: Option<String>,
    /// Present only on event_callback.
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

/// One inbound event (app_mention, message, edit notification, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type", default)]
    pub typ: Option<String>,
    /// Message subtype; "bot_message" and "message_changed" are never actionable.
    #[serde(default)]
    pub subtype: Option<String>,
    /// Set when the message was produced by a bot (including this one).
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// The message's own identifier.
    #[serde(default)]
    pub ts: Option<String>,
    /// Thread-root identifier; absent when the message is not in a thread yet.
    #[serde(default)]
    pub thread_ts: Option<String>,
    /// "im" for direct messages.
    #[serde(default)]
    pub channel_type: Option<String>,
}
