use async_trait::async_trait;

use crate::error::Result;

/// Operator kill switch.
#[async_trait]
pub trait SafetyGate: Send + Sync {
    /// `Err(AutosignError::KeysignDisabled)` when the plugin is paused; any
    /// other error means the gate itself could not be consulted.
    async fn enforce_keysign(&self, plugin_id: &str) -> Result<()>;
}
