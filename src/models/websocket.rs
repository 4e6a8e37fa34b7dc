use serde::{ Serialize, Deserialize };

use crate::messages;
use crate::models::chat::UserId;

/// Events the front-end delivers over the gateway socket. Every event names
/// the user it belongs to; one connection multiplexes many users.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "start")] Start {
        user_id: UserId,
    },
    #[serde(rename = "help")] Help {
        user_id: UserId,
    },
    #[serde(rename = "message")] Message {
        user_id: UserId,
        content: String,
    },
    #[serde(rename = "callback")] Callback {
        user_id: UserId,
        data: String,
        message_id: i64,
    },
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "reply")] Reply {
        content: String,
        actions: Vec<ReplyAction>,
        timestamp: i64,
    },
    #[serde(rename = "notice")] Notice {
        content: String,
    },
    #[serde(rename = "edit")] Edit {
        message_id: i64,
        content: String,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}

/// Inline action the front-end renders under a reply.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReplyAction {
    pub label: String,
    pub data: String,
}

impl ReplyAction {
    pub fn new_query() -> Self {
        Self {
            label: messages::NEW_QUERY_LABEL.to_string(),
            data: messages::NEW_QUERY_CALLBACK.to_string(),
        }
    }
}
