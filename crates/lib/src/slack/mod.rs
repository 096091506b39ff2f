//! Slack integration: Events-API wire types and the Web API client.

mod client;
mod event;

pub use client::{ChatClient, SlackClient, SlackError};
pub use event::{SlackEnvelope, SlackEvent};
