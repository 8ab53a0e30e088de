//! Password reset: the registration messages replayed against an existing
//! record, which is overwritten at step two.

use serde::{Deserialize, Serialize};

use crate::opaque::OpaqueService;
use crate::types::CoreUser;

use super::{CMD_RESET_STEP_ONE, CMD_RESET_STEP_TWO, OpaqueClientCommand, OpaqueServerReply, Reply};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResetPayload {
    pub user: CoreUser,
}

pub fn handle(svc: &OpaqueService, message: &OpaqueClientCommand) -> Reply {
    let payload: ClientResetPayload = match serde_json::from_str(&message.client_payload) {
        Ok(payload) => payload,
        Err(e) => return Reply::error("400", "Invalid client payload", e),
    };

    match message.command_type.as_str() {
        CMD_RESET_STEP_ONE => handle_step_one(svc, message, &payload),
        CMD_RESET_STEP_TWO => handle_step_two(svc, message, &payload),
        other => Reply::error("400", "Unsupported password reset command", other),
    }
}

fn handle_step_one(
    svc: &OpaqueService,
    message: &OpaqueClientCommand,
    payload: &ClientResetPayload,
) -> Reply {
    let response =
        match svc.password_reset_step1(&payload.user, &message.opaque_client_response) {
            Ok(response) => response,
            Err(e) => return Reply::error("400", "Password reset Step 1 failed", e),
        };

    let reply = OpaqueServerReply {
        command_type: CMD_RESET_STEP_ONE.to_string(),
        opaque_server_state_envelope: None,
        opaque_server_response: response,
        server_payload: String::new(),
    };
    Reply::ok(&reply, "OK")
}

fn handle_step_two(
    svc: &OpaqueService,
    message: &OpaqueClientCommand,
    payload: &ClientResetPayload,
) -> Reply {
    if let Err(e) = svc.password_reset_step2(&payload.user, &message.opaque_client_response) {
        return Reply::error("400", "Password reset Step 2 failed", e);
    }

    let reply = OpaqueServerReply {
        command_type: CMD_RESET_STEP_TWO.to_string(),
        opaque_server_state_envelope: None,
        opaque_server_response: "Password reset complete".to_string(),
        server_payload: String::new(),
    };
    Reply::ok(&reply, "OK")
}
