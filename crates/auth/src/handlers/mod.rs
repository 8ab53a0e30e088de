//! Command dispatch and the uniform reply shape.
//!
//! Every handler resolves to the same quadruple of payload, status, info
//! and extended info; the HTTP layer maps it onto a
//! [`crate::transport::TransportMessage`] without ever seeing handler
//! internals. No error propagates past this boundary as anything but a
//! status triple.

use std::sync::Arc;

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ServiceConfig;
use crate::envelope::OpaqueServerStateEnvelope;
use crate::keyring::KeyRing;
use crate::opaque::OpaqueService;
use crate::registry::AuthPlugin;
use crate::store::UserStore;
use crate::{hashcash, protocol};

mod init;
mod login;
mod password_reset;
mod register;

pub const CMD_LOGIN_STEP_ONE: &str = "OPAQUE_LOGIN_STEP_ONE";
pub const CMD_LOGIN_STEP_TWO: &str = "OPAQUE_LOGIN_STEP_TWO";
pub const CMD_REGISTER_STEP_ONE: &str = "OPAQUE_REGISTER_STEP_ONE";
pub const CMD_REGISTER_STEP_TWO: &str = "OPAQUE_REGISTER_STEP_TWO";
pub const CMD_RESET_STEP_ONE: &str = "OPAQUE_RESET_STEP_ONE";
pub const CMD_RESET_STEP_TWO: &str = "OPAQUE_RESET_STEP_TWO";

/// The uniform result every handler produces.
#[derive(Debug, Clone)]
pub struct Reply {
    pub payload: Option<serde_json::Value>,
    pub status: &'static str,
    pub status_info: String,
    pub status_extended_info: String,
}

impl Reply {
    pub fn ok<T: Serialize>(payload: &T, info: &str) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => Self {
                payload: Some(value),
                status: "200",
                status_info: info.to_string(),
                status_extended_info: String::new(),
            },
            Err(e) => Self::error("500", "Failed to encode payload", e),
        }
    }

    pub fn with_payload<T: Serialize>(
        payload: &T,
        status: &'static str,
        info: &str,
        extended: impl ToString,
    ) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => Self {
                payload: Some(value),
                status,
                status_info: info.to_string(),
                status_extended_info: extended.to_string(),
            },
            Err(e) => Self::error("500", "Failed to encode payload", e),
        }
    }

    pub fn error(status: &'static str, info: &str, extended: impl ToString) -> Self {
        Self {
            payload: None,
            status,
            status_info: info.to_string(),
            status_extended_info: extended.to_string(),
        }
    }
}

/// One OPAQUE sub-command from the client, PoW solution attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpaqueClientCommand {
    #[serde(rename = "pow")]
    pub pow_solution: String,
    pub unix_timestamp: i64,
    pub command_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opaque_server_state_envelope: Option<OpaqueServerStateEnvelope>,
    #[serde(rename = "client_response")]
    pub opaque_client_response: String,
    pub client_payload: String,
}

/// The server's half of one OPAQUE sub-command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpaqueServerReply {
    pub command_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opaque_server_state_envelope: Option<OpaqueServerStateEnvelope>,
    pub opaque_server_response: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_payload: String,
}

/// The protocol master handler: owns the OPAQUE service, key material and
/// admission configuration, and answers everything under the auth routes.
pub struct PersephoneHandler {
    svc: OpaqueService,
    keys: Arc<KeyRing>,
    config: ServiceConfig,
}

impl PersephoneHandler {
    pub fn new(store: Arc<dyn UserStore>, keys: Arc<KeyRing>, config: ServiceConfig) -> Self {
        Self {
            svc: OpaqueService::new(store, keys.clone()),
            keys,
            config,
        }
    }

    /// Routes the raw inner payload by outer command.
    pub fn dispatch(&self, raw: &str) -> Reply {
        let envelope = match protocol::unwrap_request(raw) {
            Ok(envelope) => envelope,
            Err(e) => return Reply::error("400", "Invalid PSP request", e),
        };
        let command = envelope.persephone_command.as_str();

        // Protocol initiation is the only command that needs no trace id.
        if command == protocol::CMD_INITIATE_PROTOCOL {
            return handle_protocol_init(&self.keys);
        }

        if let Err(e) =
            protocol::verify_trace_id(&self.keys, &envelope.trace_id, &envelope.trace_id_signature)
        {
            return Reply::error("403", "Trace validation failed", e);
        }

        match command {
            protocol::CMD_INITIATE_OPAQUE => wrap_reply(
                &envelope,
                init::handle_pow_init(
                    &self.keys,
                    &self.config.opaque_pow,
                    &envelope.persephone_payload,
                ),
            ),
            protocol::CMD_OPAQUE_EXECUTE => {
                wrap_reply(&envelope, self.dispatch_opaque(&envelope.persephone_payload))
            }
            protocol::CMD_INITIATE_HYDRATE => wrap_reply(
                &envelope,
                init::handle_pow_init(
                    &self.keys,
                    &self.config.hydrate_pow,
                    &envelope.persephone_payload,
                ),
            ),
            protocol::CMD_HYDRATE_EXECUTE => {
                Reply::error("400", "Unsupported PSP command", command)
            }
            unknown => Reply::error("400", "Unknown PSP command", unknown),
        }
    }

    /// Dispatches one OPAQUE execute sub-command after re-verifying the
    /// solved admission token.
    fn dispatch_opaque(&self, payload: &str) -> Reply {
        let message: OpaqueClientCommand = match serde_json::from_str(payload) {
            Ok(message) => message,
            Err(e) => return Reply::error("400", "Invalid OPAQUE message", e),
        };

        if let Err(e) = hashcash::verify(
            &self.keys,
            &message.pow_solution,
            &self.config.opaque_pow.subject,
        ) {
            return Reply::error("403", "PoW verification failed", e);
        }

        debug!(command_type = %message.command_type, "dispatching OPAQUE sub-command");
        match message.command_type.as_str() {
            CMD_LOGIN_STEP_ONE | CMD_LOGIN_STEP_TWO => {
                login::handle(&self.svc, &self.keys, &message)
            }
            CMD_REGISTER_STEP_ONE | CMD_REGISTER_STEP_TWO => {
                register::handle(&self.svc, &message)
            }
            CMD_RESET_STEP_ONE | CMD_RESET_STEP_TWO => {
                password_reset::handle(&self.svc, &message)
            }
            unknown => Reply::error("400", "Unknown OPAQUE subcommand", unknown),
        }
    }
}

impl AuthPlugin for PersephoneHandler {
    fn routes(&self) -> Vec<&'static str> {
        vec!["/login", "/register", "/password-reset"]
    }

    fn handle(&self, _path: &str, payload: &str) -> Reply {
        self.dispatch(payload)
    }
}

/// Issues a fresh signed trace id. The envelope itself is the payload.
fn handle_protocol_init(keys: &KeyRing) -> Reply {
    let trace_id = protocol::generate_trace_id(&mut OsRng);
    let signature = protocol::sign_trace_id(keys, &trace_id);
    let reply =
        protocol::PersephoneEnvelope::reply(protocol::CMD_INITIATE_PROTOCOL, String::new(), &trace_id, &signature);
    Reply::ok(&reply, "OK")
}

/// Wraps a handler's inner payload back into the outer envelope, echoing
/// the caller's trace identity.
fn wrap_reply(request: &protocol::PersephoneEnvelope, inner: Reply) -> Reply {
    let payload_string = match &inner.payload {
        Some(value) => match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => return Reply::error("500", "Failed to marshal payload", e),
        },
        None => String::new(),
    };
    let envelope = protocol::PersephoneEnvelope::reply(
        &request.persephone_command,
        payload_string,
        &request.trace_id,
        &request.trace_id_signature,
    );
    Reply::with_payload(&envelope, inner.status, &inner.status_info, inner.status_extended_info)
}
