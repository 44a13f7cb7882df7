//! Keysign requests and the signatures a session produces.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chain::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HashFunction {
    Sha256,
    Keccak256,
}

/// One message to be co-signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysignMessage {
    /// Payload as transported to the cosigners.
    pub message: String,
    /// Declared hash of the payload; key of the returned signature map.
    pub hash: String,
    pub hash_function: HashFunction,
    pub chain: Chain,
}

/// A request to co-sign an ordered set of messages.
///
/// `session_id` and `hex_encryption_key` are generated by the signer and must
/// be left empty by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysignRequest {
    pub public_key: String,
    pub messages: Vec<KeysignMessage>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub hex_encryption_key: String,
    pub policy_id: Uuid,
    pub plugin_id: String,
}

/// Threshold signature as published on the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub msg: String,
    pub r: String,
    pub s: String,
    pub der_signature: String,
    pub recovery_id: String,
}
