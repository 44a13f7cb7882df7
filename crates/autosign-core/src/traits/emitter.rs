use async_trait::async_trait;

use crate::error::Result;
use crate::types::KeysignRequest;

/// Delivers a finalized signing request to one cosigning party.
#[async_trait]
pub trait Emitter: Send + Sync {
    fn name(&self) -> &str;

    async fn sign(&self, req: &KeysignRequest) -> Result<()>;
}
