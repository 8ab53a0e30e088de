//! Registration: evaluate the blinded request, then persist the record and
//! any validated role bindings.

use serde::{Deserialize, Serialize};

use crate::opaque::OpaqueService;
use crate::types::{CoreUser, UserGroupBinding};
use crate::unix_now;

use super::{CMD_REGISTER_STEP_ONE, CMD_REGISTER_STEP_TWO, OpaqueClientCommand, OpaqueServerReply, Reply};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationPayload {
    pub user: CoreUser,
    /// Role bindings to attach after the record is stored. Each must
    /// reference the registrant.
    #[serde(default)]
    pub user_groups: Vec<UserGroupBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationAckPayload {
    pub unix_timestamp: i64,
    pub status: String,
}

pub fn handle(svc: &OpaqueService, message: &OpaqueClientCommand) -> Reply {
    let payload: ClientRegistrationPayload = match serde_json::from_str(&message.client_payload) {
        Ok(payload) => payload,
        Err(e) => return Reply::error("400", "Invalid client payload", e),
    };

    match message.command_type.as_str() {
        CMD_REGISTER_STEP_ONE => handle_step_one(svc, message, &payload),
        CMD_REGISTER_STEP_TWO => handle_step_two(svc, message, &payload),
        other => Reply::error("400", "Unknown registration command", other),
    }
}

fn handle_step_one(
    svc: &OpaqueService,
    message: &OpaqueClientCommand,
    payload: &ClientRegistrationPayload,
) -> Reply {
    let response = match svc.registration_step1(&payload.user, &message.opaque_client_response) {
        Ok(response) => response,
        Err(e) => return Reply::error("400", "OPAQUE step one failed", e),
    };

    let reply = OpaqueServerReply {
        command_type: CMD_REGISTER_STEP_ONE.to_string(),
        opaque_server_state_envelope: None,
        opaque_server_response: response,
        server_payload: String::new(),
    };
    Reply::ok(&reply, "OPAQUE step one successful")
}

fn handle_step_two(
    svc: &OpaqueService,
    message: &OpaqueClientCommand,
    payload: &ClientRegistrationPayload,
) -> Reply {
    // Bindings are validated before anything is persisted; a request that
    // tries to bind roles to another user fails whole.
    for binding in &payload.user_groups {
        if binding.core_user != payload.user {
            return Reply::error("400", "Invalid role binding", binding.core_user.encode_key());
        }
    }

    if let Err(e) = svc.registration_step2(&payload.user, &message.opaque_client_response) {
        return Reply::error("500", "OPAQUE step two failed", e);
    }

    if !payload.user_groups.is_empty() {
        if let Err(e) = svc.store().update_roles(&payload.user, &payload.user_groups) {
            return Reply::error("500", "Role binding update failed", e);
        }
    }

    let ack = RegistrationAckPayload {
        unix_timestamp: unix_now(),
        status: "success".to_string(),
    };
    let server_payload = match serde_json::to_string(&ack) {
        Ok(s) => s,
        Err(e) => return Reply::error("500", "Failed to encode ack payload", e),
    };

    let reply = OpaqueServerReply {
        command_type: CMD_REGISTER_STEP_TWO.to_string(),
        opaque_server_state_envelope: None,
        opaque_server_response: String::new(),
        server_payload,
    };
    Reply::ok(&reply, "OPAQUE registration complete")
}
