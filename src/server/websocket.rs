use crate::agent::RelayAgent;
use crate::messages;
use crate::models::websocket::{ ClientEvent, ReplyAction, ServerEvent };

use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::{ TcpListener, TcpStream };
use tokio::sync::mpsc;

use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ ErrorResponse, Request, Response };
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use hmac::{ Hmac, Mac };
use sha2::Sha256;
use chrono::Utc;
use url::form_urlencoded;

use log::{ info, warn, error };
use futures::{ SinkExt, StreamExt };
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap()));
}

pub async fn start_ws_server(
    addr: &str,
    agent: Arc<RelayAgent>,
    api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS gateway listening on: {}", listener.local_addr()?);
    serve(listener, agent, api_key).await
}

async fn serve(
    listener: TcpListener,
    agent: Arc<RelayAgent>,
    api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let agent_clone = Arc::clone(&agent);
        let required_api_key = api_key.clone();

        tokio::spawn(async move {
            if let Err(e) = process_connection(peer, stream, agent_clone, required_api_key).await {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

fn unauthorized(reason: &str) -> ErrorResponse {
    Response::builder()
        .status(401)
        .body(Some(reason.to_string()))
        .unwrap()
}

async fn process_connection(
    peer: SocketAddr,
    stream: TcpStream,
    agent: Arc<RelayAgent>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => return Ok(response),
        };

        let qs = req.uri().query().unwrap_or("");
        let params: HashMap<String, String> =
            form_urlencoded::parse(qs.as_bytes()).into_owned().collect();

        let ts = params.get("ts").map(|s| s.as_str());
        let sig = params.get("sig").map(|s| s.as_str());

        if let (Some(ts), Some(sig)) = (ts, sig) {
            let now = Utc::now().timestamp();
            let ts_i: i64 = ts.parse().unwrap_or(0);
            if (now - ts_i).abs() > 300 {
                return Err(unauthorized("timestamp out of range"));
            }

            let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
            mac.update(ts.as_bytes());
            let expected = hex::encode(mac.finalize().into_bytes());

            if expected == sig {
                Ok(response)
            } else {
                Err(unauthorized("bad signature"))
            }
        } else {
            Err(unauthorized("missing ts/sig"))
        }
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, agent).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

/// One front-end connection. Every inbound event is dispatched on its own
/// task so a slow exchange for one user never stalls events for another;
/// replies are funneled back through a single writer task.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    agent: Arc<RelayAgent>
)
    where S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static
{
    info!("New WebSocket connection: {}", peer);
    let connection_id = Uuid::new_v4();

    let (mut sink, mut stream) = websocket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(32);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(message) => {
                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Frame from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    send_event(&tx, ServerEvent::Error {
                        message: "Message too large".to_string(),
                    }).await;
                    break;
                }

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                let agent = Arc::clone(&agent);
                                let tx = tx.clone();
                                tokio::spawn(async move {
                                    dispatch_event(event, agent, tx).await;
                                });
                            }
                            Err(e) => {
                                warn!("Failed to parse event from {}: {}", peer, e);
                                send_event(&tx, ServerEvent::Error {
                                    message: format!("Failed to parse event: {}", e),
                                }).await;
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if tx.send(Message::Pong(ping_data)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {/* Usually ignore pongs */}
                    Message::Binary(_) => {
                        warn!("Ignoring binary frame from {}", peer);
                    }
                    Message::Frame(_) => {/* Usually ignore raw frames */}
                }
            }
            Err(e) => {
                info!("WebSocket receive error for {}: {}", peer, e);
                break;
            }
        }
    }

    drop(tx);
    let _ = writer.await;
    info!("WebSocket connection closed for {} (connection {})", peer, connection_id);
}

async fn dispatch_event(event: ClientEvent, agent: Arc<RelayAgent>, tx: mpsc::Sender<Message>) {
    match event {
        ClientEvent::Start { user_id } => {
            agent.reset(user_id).await;
            send_event(&tx, reply_with_new_query(messages::GREETING.to_string())).await;
        }
        ClientEvent::Help { user_id: _ } => {
            send_event(&tx, ServerEvent::Reply {
                content: messages::HELP_TEXT.to_string(),
                actions: Vec::new(),
                timestamp: Utc::now().timestamp(),
            }).await;
        }
        ClientEvent::Message { user_id, content } => {
            let reply = agent.process_message(user_id, &content).await;
            send_event(&tx, reply_with_new_query(reply)).await;
        }
        ClientEvent::Callback { user_id, data, message_id } => {
            if data == messages::NEW_QUERY_CALLBACK {
                agent.reset(user_id).await;
                send_event(&tx, ServerEvent::Notice {
                    content: messages::RESET_NOTICE.to_string(),
                }).await;
                send_event(&tx, ServerEvent::Edit {
                    message_id,
                    content: messages::RESET_CONFIRMATION.to_string(),
                }).await;
            } else {
                warn!("Ignoring unknown callback '{}' from user {}", data, user_id);
            }
        }
    }
}

fn reply_with_new_query(content: String) -> ServerEvent {
    ServerEvent::Reply {
        content,
        actions: vec![ReplyAction::new_query()],
        timestamp: Utc::now().timestamp(),
    }
}

async fn send_event(tx: &mpsc::Sender<Message>, event: ServerEvent) {
    match serde_json::to_string(&event) {
        Ok(json) => {
            if tx.send(Message::Text(json)).await.is_err() {
                warn!("Connection writer gone, dropping outbound event");
            }
        }
        Err(e) => error!("Failed to serialize outbound event: {}", e),
    }
}
