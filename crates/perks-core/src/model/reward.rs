use chrono::{DateTime, Utc};
use serde::Serialize;

use super::reward_state::{RewardId, is_expired};

/// A catalog entry users can have applied and then claim before `expires`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reward {
    pub id: RewardId,
    pub name: String,
    pub description: String,
    pub expires: DateTime<Utc>,
}

impl Reward {
    /// See [`is_expired`]; this is the same check claims run.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expires, now)
    }
}

/// Fields for a reward about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReward {
    pub name: String,
    pub description: String,
    pub expires: DateTime<Utc>,
}

/// Partial update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

impl RewardPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.expires.is_none()
    }
}
