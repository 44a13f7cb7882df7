//! Session rendezvous contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Signature;

#[async_trait]
pub trait Relay: Send + Sync {
    /// Party ids that have joined the session so far.
    async fn get_session(&self, session_id: &str) -> Result<Vec<String>>;

    async fn start_session(&self, session_id: &str, parties: &[String]) -> Result<()>;

    /// True once every listed party has reported completion.
    async fn check_completed_parties(&self, session_id: &str, parties: &[String]) -> Result<bool>;

    /// `Err` while the message is not resolvable yet, `Ok(None)` when the relay
    /// answered without a signature.
    async fn check_keysign_complete(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<Option<Signature>>;
}
