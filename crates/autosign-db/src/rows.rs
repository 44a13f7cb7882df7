//! Database row shapes and their conversion into domain types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use autosign_core::error::{AutosignError, Result};
use autosign_core::types::{Policy, Schedule, Tx, TxOnChainStatus, TxStatus};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PolicyRow {
    pub id: Uuid,
    pub public_key: String,
    pub plugin_id: String,
    pub plugin_version: String,
    pub policy_version: i32,
    pub signature: String,
    pub recipe: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PolicyRow> for Policy {
    fn from(r: PolicyRow) -> Self {
        Policy {
            id: r.id,
            public_key: r.public_key,
            plugin_id: r.plugin_id,
            plugin_version: r.plugin_version,
            policy_version: r.policy_version,
            signature: r.signature,
            recipe: r.recipe,
            active: r.active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ScheduleRow {
    pub policy_id: Uuid,
    pub next_execution: DateTime<Utc>,
}

impl From<ScheduleRow> for Schedule {
    fn from(r: ScheduleRow) -> Self {
        Schedule {
            policy_id: r.policy_id,
            next_execution: r.next_execution,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TxRow {
    pub id: Uuid,
    pub plugin_id: String,
    pub chain_id: String,
    pub policy_id: Uuid,
    pub from_public_key: String,
    pub to_public_key: String,
    pub proposed_tx_hex: String,
    pub tx_hash: Option<String>,
    pub status: String,
    pub status_onchain: Option<String>,
    pub lost: bool,
    pub broadcasted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TxRow> for Tx {
    type Error = AutosignError;

    fn try_from(r: TxRow) -> Result<Self> {
        let status: TxStatus = r.status.parse()?;
        let status_onchain = r
            .status_onchain
            .as_deref()
            .map(str::parse::<TxOnChainStatus>)
            .transpose()?;
        let tx = Tx {
            id: r.id,
            plugin_id: r.plugin_id,
            chain_id: r.chain_id,
            policy_id: r.policy_id,
            from_public_key: r.from_public_key,
            to_public_key: r.to_public_key,
            proposed_tx_hex: r.proposed_tx_hex,
            tx_hash: r.tx_hash,
            status,
            status_onchain,
            lost: r.lost,
            broadcasted_at: r.broadcasted_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        };
        if !tx.has_consistent_broadcast_state() {
            return Err(AutosignError::Database(format!(
                "tx {}: status_onchain and broadcasted_at disagree",
                tx.id
            )));
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> TxRow {
        let now = Utc::now();
        TxRow {
            id: Uuid::new_v4(),
            plugin_id: "dca".into(),
            chain_id: "ethereum".into(),
            policy_id: Uuid::new_v4(),
            from_public_key: "02from".into(),
            to_public_key: "02to".into(),
            proposed_tx_hex: "0xf8".into(),
            tx_hash: Some("0xabc".into()),
            status: "SIGNED".into(),
            status_onchain: Some("PENDING".into()),
            lost: false,
            broadcasted_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_tx_row_conversion() {
        let tx = Tx::try_from(row()).unwrap();
        assert_eq!(tx.status, TxStatus::Signed);
        assert_eq!(tx.status_onchain, Some(TxOnChainStatus::Pending));
    }

    #[test]
    fn test_unbroadcast_row() {
        let mut r = row();
        r.status = "PROPOSED".into();
        r.status_onchain = None;
        r.broadcasted_at = None;
        r.tx_hash = None;
        let tx = Tx::try_from(r).unwrap();
        assert_eq!(tx.status, TxStatus::Proposed);
        assert!(tx.status_onchain.is_none());
    }

    #[test]
    fn test_bad_rows_rejected() {
        let mut r = row();
        r.status = "BROADCAST".into();
        assert!(matches!(Tx::try_from(r), Err(AutosignError::Database(_))));

        let mut r = row();
        r.status_onchain = Some("MAYBE".into());
        assert!(Tx::try_from(r).is_err());

        let mut r = row();
        r.broadcasted_at = None;
        assert!(Tx::try_from(r).is_err());
    }
}
