//! The proof-of-work init sub-protocol: four logical steps over two round
//! trips. Step one hands out a signed challenge; step three checks the
//! client's solution. Both the OPAQUE and hydrate flows run this dance,
//! differing only in admission subject.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::config::PowConfig;
use crate::keyring::KeyRing;
use crate::{hashcash, unix_now};

use super::Reply;

pub const INIT_STEP_ONE: &str = "STEP_ONE";
pub const INIT_STEP_THREE: &str = "STEP_THREE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub init_step: String,
    pub init_payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitStepOnePayload {
    pub unix_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengePayload {
    pub unix_timestamp: i64,
    pub pow_challenge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionPayload {
    pub unix_timestamp: i64,
    #[serde(rename = "pow_challenge")]
    pub pow_solution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResultPayload {
    pub unix_timestamp: i64,
    pub success: bool,
}

pub fn handle_pow_init(keys: &KeyRing, pow: &PowConfig, payload: &str) -> Reply {
    let request: InitRequest = match serde_json::from_str(payload) {
        Ok(request) => request,
        Err(e) => return Reply::error("400", "Invalid init JSON", e),
    };

    match request.init_step.as_str() {
        INIT_STEP_ONE => handle_step_one(keys, pow, &request.init_payload),
        INIT_STEP_THREE => handle_step_three(keys, pow, &request.init_payload),
        unknown => Reply::error("400", "Unknown init_step", unknown),
    }
}

fn handle_step_one(keys: &KeyRing, pow: &PowConfig, payload: &str) -> Reply {
    if let Err(e) = serde_json::from_str::<InitStepOnePayload>(payload) {
        return Reply::error("400", "Invalid StepOne payload", e);
    }

    let challenge = match hashcash::create(keys, &pow.subject, pow.difficulty, pow.ttl, &mut OsRng)
    {
        Ok(challenge) => challenge,
        Err(e) => return Reply::error("500", "PoW challenge creation failed", e),
    };

    let response = ChallengePayload {
        unix_timestamp: unix_now(),
        pow_challenge: challenge.token(),
    };
    Reply::ok(&response, "PoW challenge issued")
}

fn handle_step_three(keys: &KeyRing, pow: &PowConfig, payload: &str) -> Reply {
    let solution: SolutionPayload = match serde_json::from_str(payload) {
        Ok(solution) => solution,
        Err(e) => return Reply::error("400", "Invalid StepThree payload", e),
    };

    if let Err(e) = hashcash::verify(keys, &solution.pow_solution, &pow.subject) {
        let response = InitResultPayload {
            unix_timestamp: unix_now(),
            success: false,
        };
        return Reply::with_payload(&response, "403", "PoW verification failed", e);
    }

    let response = InitResultPayload {
        unix_timestamp: unix_now(),
        success: true,
    };
    Reply::ok(&response, "PoW verified")
}
