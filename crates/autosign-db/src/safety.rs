use async_trait::async_trait;
use sqlx::PgPool;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::SafetyGate;

/// Kill switch backed by `control_flags`.
#[derive(Clone)]
pub struct PgSafetyGate {
    pool: PgPool,
}

pub fn keysign_flag_key(plugin_id: &str) -> String {
    format!("{plugin_id}-keysign")
}

impl PgSafetyGate {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn set_keysign_enabled(&self, plugin_id: &str, enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO control_flags (key, enabled) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET enabled = EXCLUDED.enabled, updated_at = NOW()
            "#,
        )
        .bind(keysign_flag_key(plugin_id))
        .bind(enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| AutosignError::Safety(format!("set flag for {plugin_id}: {e}")))?;
        tracing::info!("🚦 Keysign for plugin '{plugin_id}' {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }
}

#[async_trait]
impl SafetyGate for PgSafetyGate {
    async fn enforce_keysign(&self, plugin_id: &str) -> Result<()> {
        let flag: Option<(bool,)> = sqlx::query_as("SELECT enabled FROM control_flags WHERE key = $1")
            .bind(keysign_flag_key(plugin_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AutosignError::Safety(format!("read flag for {plugin_id}: {e}")))?;
        match flag {
            Some((false,)) => Err(AutosignError::KeysignDisabled(plugin_id.to_string())),
            // No row means nobody ever paused it.
            _ => Ok(()),
        }
    }
}
