//! Per-user reward lifecycle.
//!
//! A user's relationship to a reward is one of three states, stored as the
//! presence and value of a key in the user's [`RewardStates`] map:
//!
//! ```text
//! Unapplied --apply--> Applied
//! Applied   --revoke-> Unapplied
//! Applied   --claim--> Claimed     (only while now < expires)
//! Claimed   (terminal)
//! ```

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::ParseIntError;
use std::{fmt, str::FromStr};

use crate::error::StateConflict;

/// Store-assigned reward identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(i64);

impl RewardId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RewardId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Where a user stands with one reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardStatus {
    Unapplied,
    Applied,
    Claimed,
}

impl RewardStatus {
    const fn from_entry(entry: Option<bool>) -> Self {
        match entry {
            None => Self::Unapplied,
            Some(false) => Self::Applied,
            Some(true) => Self::Claimed,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unapplied => "unapplied",
            Self::Applied => "applied",
            Self::Claimed => "claimed",
        }
    }
}

impl fmt::Display for RewardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a reward expiring at `expires` is past claiming at `now`.
/// Claims succeed only strictly before the expiry instant.
#[must_use]
pub fn is_expired(expires: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires <= now
}

/// The three lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    Revoke,
    /// Claim, gated on the reward's expiry instant.
    Claim {
        expires: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

impl Transition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Revoke => "revoke",
            Self::Claim { .. } => "claim",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's reward-state map: reward id to claimed flag.
///
/// Key presence means applied; `false` is applied-but-unclaimed and `true` is
/// claimed. Serialized as a JSON object such as `{"7":false,"9":true}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardStates(BTreeMap<RewardId, bool>);

impl RewardStates {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    #[must_use]
    pub fn status(&self, reward: RewardId) -> RewardStatus {
        RewardStatus::from_entry(self.0.get(&reward).copied())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RewardId, RewardStatus)> + '_ {
        self.0
            .iter()
            .map(|(id, claimed)| (*id, RewardStatus::from_entry(Some(*claimed))))
    }

    /// Insert an unclaimed entry. Expiry is not consulted.
    ///
    /// # Errors
    ///
    /// [`StateConflict::AlreadyApplied`] if the reward has any entry.
    pub fn apply(&mut self, reward: RewardId) -> Result<(), StateConflict> {
        if self.0.contains_key(&reward) {
            return Err(StateConflict::AlreadyApplied { reward });
        }
        self.0.insert(reward, false);
        Ok(())
    }

    /// Remove an unclaimed entry.
    ///
    /// # Errors
    ///
    /// [`StateConflict::NothingToRevoke`] with no entry,
    /// [`StateConflict::AlreadyClaimed`] once claimed.
    pub fn revoke(&mut self, reward: RewardId) -> Result<(), StateConflict> {
        match self.0.get(&reward) {
            None => Err(StateConflict::NothingToRevoke { reward }),
            Some(true) => Err(StateConflict::AlreadyClaimed { reward }),
            Some(false) => {
                self.0.remove(&reward);
                Ok(())
            }
        }
    }

    /// Flip an unclaimed entry to claimed, provided `now` is before `expires`.
    ///
    /// # Errors
    ///
    /// [`StateConflict::NotApplied`], [`StateConflict::AlreadyClaimed`], or
    /// [`StateConflict::Expired`] when `expires <= now`.
    pub fn claim(
        &mut self,
        reward: RewardId,
        expires: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StateConflict> {
        let Some(claimed) = self.0.get_mut(&reward) else {
            return Err(StateConflict::NotApplied { reward });
        };
        if *claimed {
            return Err(StateConflict::AlreadyClaimed { reward });
        }
        if is_expired(expires, now) {
            return Err(StateConflict::Expired { reward, expires });
        }
        *claimed = true;
        Ok(())
    }

    /// Run one lifecycle operation and report the resulting status.
    ///
    /// On error the map is left untouched.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation rejects.
    pub fn transition(
        &mut self,
        reward: RewardId,
        op: Transition,
    ) -> Result<RewardStatus, StateConflict> {
        match op {
            Transition::Apply => self.apply(reward)?,
            Transition::Revoke => self.revoke(reward)?,
            Transition::Claim { expires, now } => self.claim(reward, expires, now)?,
        }
        Ok(self.status(reward))
    }
}

impl FromSql for RewardStates {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        serde_json::from_str(text).map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

impl ToSql for RewardStates {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(self)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        Ok(ToSqlOutput::from(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    const R7: RewardId = RewardId::new(7);

    #[test]
    fn expiry_boundary_is_inclusive() {
        assert!(!is_expired(at(100), at(99)));
        assert!(is_expired(at(100), at(100)));
        assert!(is_expired(at(100), at(101)));
    }

    #[test]
    fn apply_then_claim_then_claim_again() {
        let mut states = RewardStates::new();
        states.apply(R7).unwrap();
        assert_eq!(states.status(R7), RewardStatus::Applied);

        states.claim(R7, at(200), at(100)).unwrap();
        assert_eq!(states.status(R7), RewardStatus::Claimed);

        let err = states.claim(R7, at(200), at(100)).unwrap_err();
        assert_eq!(err, StateConflict::AlreadyClaimed { reward: R7 });
    }

    #[test]
    fn apply_twice_conflicts_regardless_of_flag() {
        let mut states = RewardStates::new();
        states.apply(R7).unwrap();
        assert_eq!(
            states.apply(R7),
            Err(StateConflict::AlreadyApplied { reward: R7 })
        );

        states.claim(R7, at(10), at(0)).unwrap();
        assert_eq!(
            states.apply(R7),
            Err(StateConflict::AlreadyApplied { reward: R7 })
        );
    }

    #[test]
    fn revoke_rules() {
        let mut states = RewardStates::new();
        assert_eq!(
            states.revoke(R7),
            Err(StateConflict::NothingToRevoke { reward: R7 })
        );

        states.apply(R7).unwrap();
        states.revoke(R7).unwrap();
        assert_eq!(states.status(R7), RewardStatus::Unapplied);
        assert!(states.is_empty());

        states.apply(R7).unwrap();
        states.claim(R7, at(10), at(0)).unwrap();
        assert_eq!(
            states.revoke(R7),
            Err(StateConflict::AlreadyClaimed { reward: R7 })
        );
        assert_eq!(states.status(R7), RewardStatus::Claimed);
    }

    #[test]
    fn claim_requires_apply() {
        let mut states = RewardStates::new();
        assert_eq!(
            states.claim(R7, at(10), at(0)),
            Err(StateConflict::NotApplied { reward: R7 })
        );
    }

    #[test]
    fn claim_exactly_at_expiry_fails() {
        let mut states = RewardStates::new();
        states.apply(R7).unwrap();

        let expires = at(1_000);
        assert_eq!(
            states.claim(R7, expires, expires),
            Err(StateConflict::Expired {
                reward: R7,
                expires
            })
        );
        assert_eq!(states.status(R7), RewardStatus::Applied);

        states
            .claim(R7, expires, expires - Duration::milliseconds(1))
            .unwrap();
        assert_eq!(states.status(R7), RewardStatus::Claimed);
    }

    #[test]
    fn apply_ignores_expiry() {
        let mut states = RewardStates::new();
        // A reward that expired long ago can still be applied, just not claimed.
        states.apply(R7).unwrap();
        assert!(matches!(
            states.claim(R7, at(0), at(100)),
            Err(StateConflict::Expired { .. })
        ));
    }

    #[test]
    fn serializes_as_string_keyed_object() {
        let mut states = RewardStates::new();
        states.apply(RewardId::new(7)).unwrap();
        states.apply(RewardId::new(9)).unwrap();
        states.claim(RewardId::new(9), at(10), at(0)).unwrap();

        let json = serde_json::to_string(&states).unwrap();
        assert_eq!(json, r#"{"7":false,"9":true}"#);

        let back: RewardStates = serde_json::from_str(&json).unwrap();
        assert_eq!(back, states);
    }

    #[test]
    fn rejects_malformed_blobs() {
        assert!(serde_json::from_str::<RewardStates>(r#"{"seven":false}"#).is_err());
        assert!(serde_json::from_str::<RewardStates>(r#"{"7":"yes"}"#).is_err());
        assert!(serde_json::from_str::<RewardStates>("[]").is_err());
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Apply,
        Revoke,
        Claim { expired: bool },
    }

    fn op_strategy() -> impl Strategy<Value = (u8, Op)> {
        (
            0u8..4,
            prop_oneof![
                Just(Op::Apply),
                Just(Op::Revoke),
                any::<bool>().prop_map(|expired| Op::Claim { expired }),
            ],
        )
    }

    proptest! {
        #[test]
        fn random_sequences_respect_lifecycle(ops in prop::collection::vec(op_strategy(), 0..64)) {
            let now = at(1_000);
            let mut states = RewardStates::new();

            for (raw_id, op) in ops {
                let reward = RewardId::new(i64::from(raw_id));
                let before = states.clone();
                let prior = states.status(reward);

                let transition = match op {
                    Op::Apply => Transition::Apply,
                    Op::Revoke => Transition::Revoke,
                    Op::Claim { expired } => Transition::Claim {
                        expires: if expired { now } else { now + Duration::seconds(60) },
                        now,
                    },
                };

                match states.transition(reward, transition) {
                    Ok(after) => {
                        let expected = match (prior, op) {
                            (RewardStatus::Unapplied, Op::Apply) => RewardStatus::Applied,
                            (RewardStatus::Applied, Op::Revoke) => RewardStatus::Unapplied,
                            (RewardStatus::Applied, Op::Claim { expired: false }) => RewardStatus::Claimed,
                            other => panic!("unexpected success for {other:?}"),
                        };
                        prop_assert_eq!(after, expected);
                    }
                    Err(_) => {
                        prop_assert_eq!(&states, &before);
                    }
                }

                // Claimed is terminal.
                if prior == RewardStatus::Claimed {
                    prop_assert_eq!(states.status(reward), RewardStatus::Claimed);
                }
            }
        }
    }
}
