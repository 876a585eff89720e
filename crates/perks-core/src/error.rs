use std::fmt;

use chrono::{DateTime, Utc};

use crate::fields::EntityKind;
use crate::model::reward_state::RewardId;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UserNotFound,
    RewardNotFound,
    InvalidField,
    InvalidColumn,
    InvalidUserRef,
    InvalidEmail,
    AlreadyApplied,
    NothingToRevoke,
    AlreadyClaimed,
    NotApplied,
    RewardExpired,
    StoreFailure,
    CorruptRecord,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UserNotFound => "E2001",
            Self::RewardNotFound => "E2002",
            Self::InvalidField => "E2101",
            Self::InvalidColumn => "E2102",
            Self::InvalidUserRef => "E2103",
            Self::InvalidEmail => "E2104",
            Self::AlreadyApplied => "E3001",
            Self::NothingToRevoke => "E3002",
            Self::AlreadyClaimed => "E3003",
            Self::NotApplied => "E3004",
            Self::RewardExpired => "E3005",
            Self::StoreFailure => "E5001",
            Self::CorruptRecord => "E5002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UserNotFound => "User not found",
            Self::RewardNotFound => "Reward not found",
            Self::InvalidField => "Invalid field",
            Self::InvalidColumn => "Invalid search column",
            Self::InvalidUserRef => "Invalid user reference",
            Self::InvalidEmail => "Invalid email address",
            Self::AlreadyApplied => "Reward already applied",
            Self::NothingToRevoke => "Nothing to revoke",
            Self::AlreadyClaimed => "Reward already claimed",
            Self::NotApplied => "Reward not applied",
            Self::RewardExpired => "Reward expired",
            Self::StoreFailure => "Store operation failed",
            Self::CorruptRecord => "Corrupt stored record",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `perks init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .perks/config.toml and retry."),
            Self::UserNotFound => Some("Use `perks user list` to see available users."),
            Self::RewardNotFound => Some("Use `perks reward list` to see available rewards."),
            Self::InvalidField => Some("User fields: id, name, email, dob, rewards. Reward fields: id, name, description, expires."),
            Self::InvalidColumn => Some("Search users by name or email; rewards by name or description."),
            Self::InvalidUserRef => Some("Pass a numeric user id or an email address."),
            Self::InvalidEmail => Some("Emails must contain `@` and no surrounding whitespace."),
            Self::AlreadyApplied | Self::AlreadyClaimed | Self::RewardExpired => None,
            Self::NothingToRevoke | Self::NotApplied => {
                Some("Apply the reward first with `perks apply <reward> <user>`.")
            }
            Self::StoreFailure => Some("Check the database path and permissions, then retry."),
            Self::CorruptRecord => Some("Inspect the stored row; the reward-state blob must map reward ids to booleans."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Caller errors rejected before any store access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid field \"{field}\" for {kind}")]
    InvalidField { kind: EntityKind, field: String },

    #[error("invalid search column \"{column}\" for {kind}")]
    InvalidColumn { kind: EntityKind, column: String },

    #[error("invalid user reference \"{value}\": expected a numeric id or an email address")]
    InvalidUserRef { value: String },

    #[error("invalid email \"{value}\": expected an address containing '@'")]
    InvalidEmail { value: String },
}

impl ValidationError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidField { .. } => ErrorCode::InvalidField,
            Self::InvalidColumn { .. } => ErrorCode::InvalidColumn,
            Self::InvalidUserRef { .. } => ErrorCode::InvalidUserRef,
            Self::InvalidEmail { .. } => ErrorCode::InvalidEmail,
        }
    }
}

/// Business-rule violations of the reward lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateConflict {
    #[error("reward {reward} is already applied")]
    AlreadyApplied { reward: RewardId },

    #[error("reward {reward} is not applied; nothing to revoke")]
    NothingToRevoke { reward: RewardId },

    #[error("reward {reward} has already been claimed")]
    AlreadyClaimed { reward: RewardId },

    #[error("reward {reward} cannot be claimed before it is applied")]
    NotApplied { reward: RewardId },

    #[error("reward {reward} expired at {expires}")]
    Expired {
        reward: RewardId,
        expires: DateTime<Utc>,
    },
}

impl StateConflict {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyApplied { .. } => ErrorCode::AlreadyApplied,
            Self::NothingToRevoke { .. } => ErrorCode::NothingToRevoke,
            Self::AlreadyClaimed { .. } => ErrorCode::AlreadyClaimed,
            Self::NotApplied { .. } => ErrorCode::NotApplied,
            Self::Expired { .. } => ErrorCode::RewardExpired,
        }
    }
}

/// Top-level error for every store operation.
#[derive(Debug, thiserror::Error)]
pub enum PerksError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{kind} {key} not found")]
    NotFound { kind: EntityKind, key: String },

    #[error(transparent)]
    Conflict(#[from] StateConflict),

    #[error("store operation failed: {0}")]
    Store(#[from] rusqlite::Error),
}

impl PerksError {
    pub(crate) fn not_found(kind: EntityKind, key: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(err) => err.code(),
            Self::NotFound {
                kind: EntityKind::User,
                ..
            } => ErrorCode::UserNotFound,
            Self::NotFound {
                kind: EntityKind::Reward,
                ..
            } => ErrorCode::RewardNotFound,
            Self::Conflict(conflict) => conflict.code(),
            Self::Store(rusqlite::Error::FromSqlConversionFailure(..)) => ErrorCode::CorruptRecord,
            Self::Store(_) => ErrorCode::StoreFailure,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type Result<T, E = PerksError> = std::result::Result<T, E>;
