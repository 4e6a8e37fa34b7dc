use chat_relay::agent::RelayAgent;
use chat_relay::cli::Args;
use chat_relay::server::Server;
use clap::Parser;
use dotenv::dotenv;
use log::info;
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Webhook URL: {}", args.webhook_url);
    info!("Relay Timeout (s): {}", args.relay_timeout_secs);
    info!("History Max Turns: {}", args.history_max_turns);
    info!("Handshake Auth: {}", args.server_api_key.is_some());
    if let Some(http_port) = args.http_port {
        info!("HTTP Status Port: {}", http_port);
    }
    info!("-------------------------");

    let agent = Arc::new(RelayAgent::new(&args)?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, args);
    server.run().await?;

    Ok(())
}
