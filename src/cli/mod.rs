use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Inference endpoint that receives one {message, history} POST per exchange.
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: String,

    /// Host address and port for the WebSocket gateway to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional port for the HTTP status API.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Shared secret the front-end signs its handshake with. Unset disables auth.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Timeout for the webhook call, in seconds. 0 leaves the HTTP client default.
    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value = "30")]
    pub relay_timeout_secs: u64,

    /// Maximum retained turns per conversation, oldest evicted first. 0 means unbounded.
    #[arg(long, env = "HISTORY_MAX_TURNS", default_value = "0")]
    pub history_max_turns: usize,
}
