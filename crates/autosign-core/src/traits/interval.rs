use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::Policy;

/// Decides when a policy runs next.
pub trait IntervalStrategy: Send + Sync {
    /// `Ok(None)` means the policy has no further executions.
    fn from_now_when_next(&self, policy: &Policy, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;
}
