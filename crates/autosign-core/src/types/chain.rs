//! Supported chains.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AutosignError;

/// A chain the system knows how to name. Whether it can be *queried* depends
/// on which RPC adapters were configured at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Bitcoin,
    Ethereum,
    Arbitrum,
    Avalanche,
    Base,
    Bsc,
    Optimism,
    Polygon,
}

impl Chain {
    pub const ALL: [Chain; 8] = [
        Chain::Bitcoin,
        Chain::Ethereum,
        Chain::Arbitrum,
        Chain::Avalanche,
        Chain::Base,
        Chain::Bsc,
        Chain::Optimism,
        Chain::Polygon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Avalanche => "avalanche",
            Chain::Base => "base",
            Chain::Bsc => "bsc",
            Chain::Optimism => "optimism",
            Chain::Polygon => "polygon",
        }
    }

    /// Account-model chains that expose `eth_getTransactionReceipt`.
    pub fn is_evm(&self) -> bool {
        !matches!(self, Chain::Bitcoin)
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = AutosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Chain::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| AutosignError::UnsupportedChain(s.to_string()))
    }
}
