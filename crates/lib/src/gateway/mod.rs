//! Gateway: HTTP webhook entry point.
//!
//! One port serves the health probe and the Slack events endpoint. The
//! webhook handler acknowledges immediately and runs orchestration in the
//! background.

mod server;

pub use server::{run_gateway, GatewayState};
