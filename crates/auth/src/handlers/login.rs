//! Login: KE1 -> KE2 with a sealed envelope, then KE3 + envelope ->
//! per-role encrypted tickets.

use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::keyring::KeyRing;
use crate::opaque::OpaqueService;
use crate::ticket::{self, TicketPurpose};
use crate::types::{CoreUser, UniqueUser, UserGroup};
use crate::{B64, envelope};

use super::{CMD_LOGIN_STEP_ONE, CMD_LOGIN_STEP_TWO, OpaqueClientCommand, OpaqueServerReply, Reply};

pub const LOGIN_SUCCESS_RESPONSE_VERSION: &str = "v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientLoginPayload {
    pub user: CoreUser,
}

/// One selectable role, its ticket encrypted under the session key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginPerUserGroupEntry {
    pub user_group_id: UserGroup,
    pub user_group_name: String,
    pub encrypted_ticket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSuccessResponse {
    pub version: String,
    pub success: bool,
    pub user_group_count: usize,
    pub user_groups: Vec<LoginPerUserGroupEntry>,
}

pub fn handle(svc: &OpaqueService, keys: &KeyRing, message: &OpaqueClientCommand) -> Reply {
    match message.command_type.as_str() {
        CMD_LOGIN_STEP_ONE => handle_step_one(svc, keys, message),
        CMD_LOGIN_STEP_TWO => match handle_step_two(svc, keys, message) {
            Ok(server_payload) => {
                let reply = OpaqueServerReply {
                    command_type: CMD_LOGIN_STEP_TWO.to_string(),
                    opaque_server_state_envelope: None,
                    opaque_server_response: String::new(),
                    server_payload,
                };
                Reply::ok(&reply, "Login successful")
            }
            Err(e) => Reply::error("400", "LoginStep2 failed", e),
        },
        other => Reply::error("400", "Unsupported login command", other),
    }
}

fn handle_step_one(svc: &OpaqueService, keys: &KeyRing, message: &OpaqueClientCommand) -> Reply {
    let payload: ClientLoginPayload = match serde_json::from_str(&message.client_payload) {
        Ok(payload) => payload,
        Err(e) => return Reply::error("400", "Invalid login payload", e),
    };

    let (ke2, ake_state) =
        match svc.login_step1(&payload.user, &message.opaque_client_response) {
            Ok(result) => result,
            Err(e) => return Reply::error("400", "LoginStep1 failed", e),
        };

    let sealed = match envelope::seal(keys, CMD_LOGIN_STEP_ONE, &ake_state, &mut OsRng) {
        Ok(sealed) => sealed,
        Err(e) => return Reply::error("500", "Failed to seal opaque state", e),
    };

    let reply = OpaqueServerReply {
        command_type: CMD_LOGIN_STEP_ONE.to_string(),
        opaque_server_state_envelope: Some(sealed),
        opaque_server_response: ke2,
        server_payload: String::new(),
    };
    Reply::ok(&reply, "Login Step One successful")
}

/// Completes the AKE and mints one encrypted ticket per role binding. A
/// user with no bindings gets a valid, empty response.
fn handle_step_two(
    svc: &OpaqueService,
    keys: &KeyRing,
    message: &OpaqueClientCommand,
) -> Result<String, String> {
    let payload: ClientLoginPayload = serde_json::from_str(&message.client_payload)
        .map_err(|e| format!("invalid login payload: {e}"))?;
    let user = payload.user;

    let sealed = message
        .opaque_server_state_envelope
        .as_ref()
        .ok_or("missing opaque server state envelope")?;
    let ake_state =
        envelope::open(keys, sealed).map_err(|e| format!("envelope decryption failed: {e}"))?;

    let session_key_b64 = svc
        .login_step2(&message.opaque_client_response, &ake_state)
        .map_err(|e| format!("key exchange step two failed: {e}"))?;
    let mut session_key = B64
        .decode(session_key_b64.as_bytes())
        .map_err(|e| format!("session key decode failed: {e}"))?;

    let bindings = svc
        .store()
        .user_groups_for_user(&user)
        .map_err(|e| format!("failed to retrieve user group bindings: {e}"))?;

    let mut entries = Vec::with_capacity(bindings.len());
    for binding in &bindings {
        let unique_user = UniqueUser::from_binding(&user, binding);
        let user_group_id = unique_user.user_group_id;

        let auth_ticket = ticket::create_auth_ticket(
            keys,
            unique_user,
            TicketPurpose::Login,
            None,
            false,
            None,
            &mut OsRng,
        )
        .map_err(|e| format!("failed to issue ticket: {e}"))?;

        let ticket_json =
            serde_json::to_vec(&auth_ticket).map_err(|e| format!("marshal auth ticket: {e}"))?;
        let encrypted_ticket =
            envelope::encrypt_ticket_with_session_key(&session_key, &ticket_json, &mut OsRng)
                .map_err(|e| format!("ticket encryption failed: {e}"))?;

        entries.push(LoginPerUserGroupEntry {
            user_group_id,
            user_group_name: user_group_id.friendly_name().to_string(),
            encrypted_ticket,
        });
    }
    session_key.zeroize();

    let response = LoginSuccessResponse {
        version: LOGIN_SUCCESS_RESPONSE_VERSION.to_string(),
        success: true,
        user_group_count: entries.len(),
        user_groups: entries,
    };
    let response_json =
        serde_json::to_vec(&response).map_err(|e| format!("marshal login response: {e}"))?;
    Ok(B64.encode(response_json))
}
