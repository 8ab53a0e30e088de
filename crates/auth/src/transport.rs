//! The uniform outer envelope at the HTTP boundary.

use serde::{Deserialize, Serialize};

use crate::handlers::Reply;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid transport message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing payload")]
    MissingPayload,
}

/// What every request and response body looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportMessage {
    pub status: String,
    pub status_info: String,
    pub status_extended_info: String,
    pub payload: String,
}

impl TransportMessage {
    pub fn error(status: &str, info: &str, extended: impl ToString) -> Self {
        Self {
            status: status.to_string(),
            status_info: info.to_string(),
            status_extended_info: extended.to_string(),
            payload: String::new(),
        }
    }
}

impl From<Reply> for TransportMessage {
    fn from(reply: Reply) -> Self {
        let payload = match reply.payload {
            Some(value) => value.to_string(),
            None => String::new(),
        };
        Self {
            status: reply.status.to_string(),
            status_info: reply.status_info,
            status_extended_info: reply.status_extended_info,
            payload,
        }
    }
}

/// Parses a request body; a message without a payload is rejected.
pub fn unwrap(raw: &[u8]) -> Result<TransportMessage, TransportError> {
    let message: TransportMessage = serde_json::from_slice(raw)?;
    if message.payload.is_empty() {
        return Err(TransportError::MissingPayload);
    }
    Ok(message)
}

/// String status -> HTTP status code. Anything unrecognized is a 200; the
/// triple inside the body is the real signal.
pub fn http_status_code(status: &str) -> u16 {
    match status {
        "400" => 400,
        "404" => 404,
        "405" => 405,
        "415" => 415,
        "422" => 422,
        "500" => 500,
        _ => 200,
    }
}
