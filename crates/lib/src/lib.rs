//! weft core library — Slack event classification, session continuity,
//! and two-phase response orchestration against a Dify backend.

pub mod classifier;
pub mod config;
pub mod dify;
pub mod gateway;
pub mod init;
pub mod orchestrator;
pub mod slack;
pub mod store;
