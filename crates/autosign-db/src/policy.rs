use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::{PolicyStore, Transactional};
use autosign_core::types::Policy;

use crate::db_err;
use crate::rows::PolicyRow;
use crate::transaction::PgTx;

/// Postgres-backed `plugin_policies`.
#[derive(Clone)]
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_plugin_policy(&self, tx: &mut PgTx, policy: &Policy) -> Result<Policy> {
        let row = sqlx::query_as::<_, PolicyRow>(
            r#"
            INSERT INTO plugin_policies
                (id, public_key, plugin_id, plugin_version, policy_version, signature, recipe, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, public_key, plugin_id, plugin_version, policy_version,
                      signature, recipe, active, created_at, updated_at
            "#,
        )
        .bind(policy.id)
        .bind(&policy.public_key)
        .bind(&policy.plugin_id)
        .bind(&policy.plugin_version)
        .bind(policy.policy_version)
        .bind(&policy.signature)
        .bind(&policy.recipe)
        .bind(policy.active)
        .fetch_one(tx.conn())
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    /// Active policies for one plugin, oldest first.
    pub async fn list_active_policies(&self, plugin_id: &str) -> Result<Vec<Policy>> {
        let rows = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, public_key, plugin_id, plugin_version, policy_version,
                   signature, recipe, active, created_at, updated_at
            FROM plugin_policies
            WHERE plugin_id = $1 AND active
            ORDER BY created_at
            "#,
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Policy::from).collect())
    }
}

#[async_trait]
impl Transactional for PgPolicyStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        PgTx::begin(&self.pool).await
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn get_plugin_policy(&self, id: Uuid) -> Result<Policy> {
        sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, public_key, plugin_id, plugin_version, policy_version,
                   signature, recipe, active, created_at, updated_at
            FROM plugin_policies
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Policy::from)
        .ok_or(AutosignError::PolicyNotFound(id))
    }

    /// The newest active policy a user holds for a plugin.
    async fn get_policy_by_public_key_and_plugin(&self, public_key: &str, plugin_id: &str) -> Result<Option<Policy>> {
        let row = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, public_key, plugin_id, plugin_version, policy_version,
                   signature, recipe, active, created_at, updated_at
            FROM plugin_policies
            WHERE public_key = $1 AND plugin_id = $2 AND active
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(public_key)
        .bind(plugin_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Policy::from))
    }

    async fn update_plugin_policy(&self, tx: &mut PgTx, policy: &Policy) -> Result<Policy> {
        sqlx::query_as::<_, PolicyRow>(
            r#"
            UPDATE plugin_policies
            SET plugin_version = $2,
                policy_version = $3,
                signature = $4,
                recipe = $5,
                active = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, public_key, plugin_id, plugin_version, policy_version,
                      signature, recipe, active, created_at, updated_at
            "#,
        )
        .bind(policy.id)
        .bind(&policy.plugin_version)
        .bind(policy.policy_version)
        .bind(&policy.signature)
        .bind(&policy.recipe)
        .bind(policy.active)
        .fetch_optional(tx.conn())
        .await
        .map_err(db_err)?
        .map(Policy::from)
        .ok_or(AutosignError::PolicyNotFound(policy.id))
    }
}
