use serde::{Deserialize, Serialize};

use crate::models::MessageRecord;

/// Events a connected client may send over a conversation socket
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "message.create")]
    MessageCreate {
        content: String,
        #[serde(default, rename = "replyTo")]
        reply_to: Option<i64>,
    },
}

/// Events the server pushes to connected clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "message.created")]
    MessageCreated { message: MessageRecord },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}
