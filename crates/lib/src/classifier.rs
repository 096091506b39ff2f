//! Event classification: decide whether an inbound Slack event is an
//! actionable human message and normalize it for the orchestrator.
//!
//! Pure; no side effects. Drop rules run in order and the first match wins:
//! bot echoes and edit notifications first, then unknown event types.

use crate::slack::SlackEvent;
use anyhow::{Context, Result};
use regex::Regex;

/// User id used when Slack omits the sender (e.g. some DM payloads).
pub const ANONYMOUS_USER: &str = "slack_user";

/// Default leading-mention token: one `<@...>` plus trailing whitespace.
const DEFAULT_MENTION_PATTERN: &str = r"^<@[^>]+>\s*";

/// Message subtypes that are never actionable: the bot's own output and
/// edit notifications (re-processing either would loop or duplicate replies).
const IGNORED_SUBTYPES: [&str; 2] = ["bot_message", "message_changed"];

/// Compiled pattern for stripping one leading addressed-to token.
/// The syntax is platform-specific, so it is configurable (slack.mentionPattern).
#[derive(Debug, Clone)]
pub struct MentionPattern {
    re: Regex,
}

impl MentionPattern {
    /// Build from an optional config override; None uses the Slack default.
    pub fn from_config(pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern.unwrap_or(DEFAULT_MENTION_PATTERN);
        let re = Regex::new(pattern)
            .with_context(|| format!("invalid mention pattern: {}", pattern))?;
        Ok(Self { re })
    }

    /// Strip one leading mention token and trim surrounding whitespace.
    pub fn strip(&self, text: &str) -> String {
        self.re.replace(text, "").trim().to_string()
    }
}

impl Default for MentionPattern {
    fn default() -> Self {
        Self {
            re: Regex::new(DEFAULT_MENTION_PATTERN).expect("default mention pattern compiles"),
        }
    }
}

/// An actionable inbound message, normalized from a Slack event.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    pub channel_id: String,
    pub user_id: String,
    /// Thread root: the event's thread_ts, or its own ts when it opens a thread.
    pub thread_ts: String,
    /// Text with the leading mention stripped and whitespace trimmed.
    pub text: String,
    pub is_mention: bool,
    pub is_direct_message: bool,
}

/// Classify one event: None means drop (bot echo, edit, unknown type, or
/// missing channel/ts). Some carries the normalized message for the orchestrator.
pub fn classify(event: &SlackEvent, mention: &MentionPattern) -> Option<NormalizedMessage> {
    if event.bot_id.is_some() {
        log::debug!("classifier: dropping bot echo");
        return None;
    }
    if let Some(ref subtype) = event.subtype {
        if IGNORED_SUBTYPES.contains(&subtype.as_str()) {
            log::debug!("classifier: dropping subtype {}", subtype);
            return None;
        }
    }

    let typ = event.typ.as_deref().unwrap_or("");
    if typ != "app_mention" && typ != "message" {
        log::debug!("classifier: dropping event type {:?}", event.typ);
        return None;
    }

    let channel_id = event.channel.clone()?;
    let ts = event.ts.clone()?;
    let thread_ts = event.thread_ts.clone().unwrap_or(ts);
    let raw_text = event.text.as_deref().unwrap_or("");

    Some(NormalizedMessage {
        channel_id,
        user_id: event
            .user
            .clone()
            .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
        thread_ts,
        text: mention.strip(raw_text),
        is_mention: typ == "app_mention",
        is_direct_message: event.channel_type.as_deref() == Some("im"),
    })
}
