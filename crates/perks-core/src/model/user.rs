use chrono::NaiveDate;
use serde::Serialize;
use std::{fmt, str::FromStr};

use super::reward_state::RewardStates;
use crate::error::ValidationError;

/// A user row, including its reward-state map.
///
/// The map is only readable from here; every change goes through the
/// store's apply, revoke, and claim operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub dob: Option<NaiveDate>,
    rewards: RewardStates,
}

impl User {
    pub(crate) const fn from_parts(
        id: i64,
        name: String,
        email: String,
        dob: Option<NaiveDate>,
        rewards: RewardStates,
    ) -> Self {
        Self {
            id,
            name,
            email,
            dob,
            rewards,
        }
    }

    #[must_use]
    pub const fn rewards(&self) -> &RewardStates {
        &self.rewards
    }
}

/// Fields for a user about to be inserted. The reward map always starts empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub dob: Option<NaiveDate>,
}

/// Partial update of a user's profile. The reward map is not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    /// `Some(None)` clears the date of birth.
    pub dob: Option<Option<NaiveDate>>,
}

impl UserPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.dob.is_none()
    }
}

/// Check that `email` can later be addressed through [`UserRef`]: it must
/// contain `@` and carry no surrounding whitespace.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidEmail`] otherwise.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.contains('@') && email.trim() == email {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail {
            value: email.to_string(),
        })
    }
}

/// How a caller names a user: by store id or by email.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserRef {
    Id(i64),
    Email(String),
}

impl FromStr for UserRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.contains('@') {
            return Ok(Self::Email(value.to_string()));
        }
        value
            .parse::<i64>()
            .map(Self::Id)
            .map_err(|_| ValidationError::InvalidUserRef {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Email(email) => f.write_str(email),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ref_parses_ids_and_emails() {
        assert_eq!("42".parse::<UserRef>().unwrap(), UserRef::Id(42));
        assert_eq!(
            " ada@example.com ".parse::<UserRef>().unwrap(),
            UserRef::Email("ada@example.com".into())
        );
    }

    #[test]
    fn user_ref_rejects_everything_else() {
        let err = "ada".parse::<UserRef>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidUserRef {
                value: "ada".into()
            }
        );
        assert!("".parse::<UserRef>().is_err());
    }

    #[test]
    fn stored_emails_must_parse_back_as_email_refs() {
        validate_email("ada@example.com").unwrap();
        assert_eq!(
            "ada@example.com".parse::<UserRef>().unwrap(),
            UserRef::Email("ada@example.com".into())
        );

        for bad in ["1", "bo.example.com", "", " ada@example.com"] {
            assert_eq!(
                validate_email(bad).unwrap_err(),
                ValidationError::InvalidEmail { value: bad.into() },
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn empty_patch() {
        assert!(UserPatch::default().is_empty());
        let clear_dob = UserPatch {
            dob: Some(None),
            ..UserPatch::default()
        };
        assert!(!clear_dob.is_empty());
    }
}
