use async_trait::async_trait;
use log::{ error, warn };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::time::Duration;
use crate::messages;
use crate::models::chat::{ Role, Turn };
use crate::relay::{ RelayClient, RelayError };

pub struct WebhookClient {
    http: HttpClient,
    endpoint: String,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    message: &'a str,
    history: Vec<HistoryEntry<'a>>,
}

/// Wire form of a prior turn. Kept separate from `Turn` so the endpoint
/// schema can change without touching the store.
#[derive(Serialize)]
struct HistoryEntry<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> From<&'a Turn> for HistoryEntry<'a> {
    fn from(turn: &'a Turn) -> Self {
        Self {
            role: turn.role,
            content: &turn.content,
        }
    }
}

#[derive(Deserialize)]
struct WebhookReply {
    response: Option<String>,
}

impl WebhookClient {
    /// `timeout_secs` of 0 leaves the HTTP client default in place.
    pub fn new(
        endpoint: String,
        timeout_secs: u64
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut builder = HttpClient::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }

        Ok(Self {
            http: builder.build()?,
            endpoint,
        })
    }

    async fn post_chat(
        &self,
        message: &str,
        history: &[Turn]
    ) -> Result<WebhookReply, RelayError> {
        let req = RelayRequest {
            message,
            history: history.iter().map(HistoryEntry::from).collect(),
        };
        let resp = self.http
            .post(&self.endpoint)
            .json(&req)
            .send().await?
            .error_for_status()?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RelayClient for WebhookClient {
    async fn relay(&self, message: &str, history: &[Turn]) -> String {
        match self.post_chat(message, history).await {
            Ok(WebhookReply { response: Some(text) }) => text,
            Ok(WebhookReply { response: None }) => {
                warn!("Endpoint {} answered without a 'response' field", self.endpoint);
                messages::NO_ANSWER_FALLBACK.to_string()
            }
            Err(e) => {
                error!("Webhook error for {}: {}", self.endpoint, e);
                messages::SERVER_ERROR_FALLBACK.to_string()
            }
        }
    }
}
