//! Gateway: HTTP hosting for the webhook.
//!
//! Single port serves the health probe and the webhook endpoint the provider calls.

mod server;

pub use server::{build_weixin, router, run_gateway, serve, GatewayState, WEBHOOK_PATH};
