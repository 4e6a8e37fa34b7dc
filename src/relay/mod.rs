mod webhook;

pub use webhook::WebhookClient;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;
use crate::cli::Args;
use crate::models::chat::Turn;

/// Bridge from one user message plus its prior history to the inference
/// endpoint and back. `relay` is total: every failure degrades to a
/// user-facing fallback text, so the exchange always completes and gets
/// recorded in history.
#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn relay(&self, message: &str, history: &[Turn]) -> String;
}

/// What went wrong talking to the endpoint. Only used for logging; the
/// caller of `relay` never sees it.
#[derive(Debug, ThisError)]
pub enum RelayError {
    #[error("request failed: {0}")] Request(#[from] reqwest::Error),
    #[error("malformed response body: {0}")] MalformedBody(#[from] serde_json::Error),
}

pub fn new_client(args: &Args) -> Result<Arc<dyn RelayClient>, Box<dyn Error + Send + Sync>> {
    info!("Relaying messages to inference endpoint: {}", args.webhook_url);
    let client = WebhookClient::new(args.webhook_url.clone(), args.relay_timeout_secs)?;
    Ok(Arc::new(client))
}
