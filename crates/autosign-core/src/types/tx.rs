//! Indexed transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::chain::Chain;
use crate::error::AutosignError;

/// Off-chain lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxStatus {
    Proposed,
    Verified,
    Signed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Proposed => "PROPOSED",
            TxStatus::Verified => "VERIFIED",
            TxStatus::Signed => "SIGNED",
        }
    }
}

impl FromStr for TxStatus {
    type Err = AutosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROPOSED" => Ok(TxStatus::Proposed),
            "VERIFIED" => Ok(TxStatus::Verified),
            "SIGNED" => Ok(TxStatus::Signed),
            other => Err(AutosignError::Database(format!("unknown tx status '{other}'"))),
        }
    }
}

/// On-chain lifecycle, known only after broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxOnChainStatus {
    Pending,
    Success,
    Fail,
}

impl TxOnChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxOnChainStatus::Pending => "PENDING",
            TxOnChainStatus::Success => "SUCCESS",
            TxOnChainStatus::Fail => "FAIL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxOnChainStatus::Pending)
    }
}

impl FromStr for TxOnChainStatus {
    type Err = AutosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TxOnChainStatus::Pending),
            "SUCCESS" => Ok(TxOnChainStatus::Success),
            "FAIL" => Ok(TxOnChainStatus::Fail),
            other => Err(AutosignError::Database(format!(
                "unknown on-chain status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for TxOnChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction tracked from proposal to on-chain resolution.
///
/// `status_onchain` and `broadcasted_at` are either both set or both unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub id: Uuid,
    pub plugin_id: String,
    /// Chain name as stored. May name a chain this build cannot query.
    pub chain_id: String,
    pub policy_id: Uuid,
    pub from_public_key: String,
    pub to_public_key: String,
    pub proposed_tx_hex: String,
    pub tx_hash: Option<String>,
    pub status: TxStatus,
    pub status_onchain: Option<TxOnChainStatus>,
    pub lost: bool,
    pub broadcasted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tx {
    pub fn chain(&self) -> Option<Chain> {
        self.chain_id.parse().ok()
    }

    /// True once `now` is past `broadcasted_at + mark_lost_after`.
    /// A deadline beyond the representable range is never reached.
    pub fn is_lost_by_timeout(&self, now: DateTime<Utc>, mark_lost_after: chrono::Duration) -> bool {
        self.broadcasted_at
            .and_then(|at| at.checked_add_signed(mark_lost_after))
            .is_some_and(|deadline| now > deadline)
    }

    pub fn has_consistent_broadcast_state(&self) -> bool {
        self.status_onchain.is_some() == self.broadcasted_at.is_some()
    }
}

/// Input for `create_tx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTx {
    pub plugin_id: String,
    pub chain: Chain,
    pub policy_id: Uuid,
    pub from_public_key: String,
    pub to_public_key: String,
    pub proposed_tx_hex: String,
}
