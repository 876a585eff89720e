//! Typed field descriptors and the allow-list validator.
//!
//! Callers name fields and search columns as strings. Those strings are
//! resolved here, against a fixed per-kind schema, into descriptor enums. The
//! query builder in [`crate::db::query`] accepts only descriptors, so a column
//! name that reaches SQL text always comes from a `&'static str` in this file.

use serde::Serialize;
use std::fmt;

use crate::error::ValidationError;

/// Output name of the resolved reward summary.
pub const RESOLVED_FIELD: &str = "rewards_resolved";

/// The two record kinds held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Reward,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Reward => "reward",
        }
    }

    /// Backing table name.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Reward => "rewards",
        }
    }

    /// Alias used for the table in generated SQL.
    #[must_use]
    pub const fn alias(self) -> &'static str {
        match self {
            Self::User => "u",
            Self::Reward => "r",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage shape of a column, used to decode projected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Text,
    /// Optional `YYYY-MM-DD` text.
    Date,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    /// JSON object of reward id to claimed flag.
    RewardStates,
}

/// A legal, selectable field of one entity kind.
pub trait Field: Copy + Eq + fmt::Debug + 'static {
    const KIND: EntityKind;

    /// Every legal field, in schema order.
    const ALL: &'static [Self];

    /// Public field name; also the column name.
    fn name(self) -> &'static str;

    fn field_type(self) -> FieldType;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    Id,
    Name,
    Email,
    Dob,
    Rewards,
}

impl Field for UserField {
    const KIND: EntityKind = EntityKind::User;
    const ALL: &'static [Self] = &[Self::Id, Self::Name, Self::Email, Self::Dob, Self::Rewards];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Email => "email",
            Self::Dob => "dob",
            Self::Rewards => "rewards",
        }
    }

    fn field_type(self) -> FieldType {
        match self {
            Self::Id => FieldType::Integer,
            Self::Name | Self::Email => FieldType::Text,
            Self::Dob => FieldType::Date,
            Self::Rewards => FieldType::RewardStates,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardField {
    Id,
    Name,
    Description,
    Expires,
}

impl Field for RewardField {
    const KIND: EntityKind = EntityKind::Reward;
    const ALL: &'static [Self] = &[Self::Id, Self::Name, Self::Description, Self::Expires];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::Expires => "expires",
        }
    }

    fn field_type(self) -> FieldType {
        match self {
            Self::Id => FieldType::Integer,
            Self::Name | Self::Description => FieldType::Text,
            Self::Expires => FieldType::Timestamp,
        }
    }
}

/// A column that substring search may target.
pub trait SearchColumn: Copy + Eq + fmt::Debug + 'static {
    type Field: Field;

    const ALL: &'static [Self];

    fn field(self) -> Self::Field;
}

/// Users are searchable by `name` or `email`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserSearchColumn {
    Name,
    Email,
}

impl SearchColumn for UserSearchColumn {
    type Field = UserField;

    const ALL: &'static [Self] = &[Self::Name, Self::Email];

    fn field(self) -> UserField {
        match self {
            Self::Name => UserField::Name,
            Self::Email => UserField::Email,
        }
    }
}

/// Rewards are searchable by `name` or `description`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardSearchColumn {
    Name,
    Description,
}

impl SearchColumn for RewardSearchColumn {
    type Field = RewardField;

    const ALL: &'static [Self] = &[Self::Name, Self::Description];

    fn field(self) -> RewardField {
        match self {
            Self::Name => RewardField::Name,
            Self::Description => RewardField::Description,
        }
    }
}

/// Resolve requested field names against the allow-list for `F`.
///
/// Duplicates are dropped, keeping first-occurrence order. The first name not
/// in the allow-list fails the whole request.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidField`] naming the first illegal field.
pub fn validate_fields<F: Field, S: AsRef<str>>(requested: &[S]) -> Result<Vec<F>, ValidationError> {
    let mut fields: Vec<F> = Vec::with_capacity(requested.len());
    for name in requested {
        let name = name.as_ref();
        let Some(field) = F::from_name(name) else {
            return Err(ValidationError::InvalidField {
                kind: F::KIND,
                field: name.to_string(),
            });
        };
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    Ok(fields)
}

/// Resolve a search column name against the per-kind column enum.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidColumn`] when `column` is not searchable.
pub fn validate_column<C: SearchColumn>(column: &str) -> Result<C, ValidationError> {
    C::ALL
        .iter()
        .copied()
        .find(|candidate| candidate.field().name() == column)
        .ok_or_else(|| ValidationError::InvalidColumn {
            kind: <C::Field as Field>::KIND,
            column: column.to_string(),
        })
}

/// Output column names for `fields`, with the resolved column last.
pub(crate) fn output_names<F: Field>(fields: &[F], resolve: bool) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = fields.iter().map(|field| field.name()).collect();
    if resolve {
        names.push(RESOLVED_FIELD);
    }
    names
}

/// A validated field selection. Empty means every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection<F: Field> {
    requested: Vec<F>,
}

impl<F: Field> Projection<F> {
    /// Select every field of the kind.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            requested: Vec::new(),
        }
    }

    /// Validate and deduplicate caller-supplied field names.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidField`] for the first unknown name.
    pub fn parse<S: AsRef<str>>(requested: &[S]) -> Result<Self, ValidationError> {
        validate_fields(requested).map(|requested| Self { requested })
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        self.requested.is_empty()
    }

    /// Column names of a projected row, in output order.
    #[must_use]
    pub fn output_names(&self) -> Vec<&'static str> {
        output_names(self.fields(), false)
    }

    /// Fields to select, in output order.
    #[must_use]
    pub fn fields(&self) -> &[F] {
        if self.requested.is_empty() {
            F::ALL
        } else {
            &self.requested
        }
    }
}

impl<F: Field> Default for Projection<F> {
    fn default() -> Self {
        Self::all()
    }
}

/// User read options: which fields, and whether to inline resolved rewards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSelection {
    pub projection: Projection<UserField>,
    pub resolve: bool,
}

impl UserSelection {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidField`] for the first unknown name.
    pub fn parse<S: AsRef<str>>(fields: &[S], resolve: bool) -> Result<Self, ValidationError> {
        Ok(Self {
            projection: Projection::parse(fields)?,
            resolve,
        })
    }

    /// Column names of a projected user row, in output order.
    #[must_use]
    pub fn output_names(&self) -> Vec<&'static str> {
        output_names(self.projection.fields(), self.resolve)
    }
}
