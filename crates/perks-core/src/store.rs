//! The record store: user and reward CRUD, projected reads, and the
//! apply/revoke/claim lifecycle over one `SQLite` connection.
//!
//! Lifecycle mutations run read-validate-write inside a `BEGIN IMMEDIATE`
//! transaction, so the write lock is held from the state read through commit.
//! Any error drops the transaction, which rolls it back.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{
    Connection, OptionalExtension, TransactionBehavior, params, params_from_iter, types::Value,
};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::db::{
    self,
    query::{
        Predicate, ProjectedRow, REWARD_COLUMNS, USER_COLUMNS, build_reward_query,
        build_user_query, row_to_reward, row_to_user,
    },
};
use crate::error::{PerksError, Result};
use crate::fields::{
    EntityKind, Projection, RewardField, RewardSearchColumn, SearchColumn, UserField,
    UserSearchColumn, UserSelection,
};
use crate::model::{
    NewReward, NewUser, Reward, RewardId, RewardPatch, RewardStates, RewardStatus, Transition,
    User, UserPatch, UserRef, validate_email,
};

/// Result of a committed lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub user: i64,
    pub reward: RewardId,
    pub status: RewardStatus,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Apply,
    Revoke,
    Claim { now: DateTime<Utc> },
}

/// Users, rewards, and reward-state maps backed by `SQLite`.
#[derive(Debug)]
pub struct RewardStore {
    conn: Connection,
}

impl RewardStore {
    /// Wrap a connection whose schema is already migrated.
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open (or create) a store file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        db::open_store(path, busy_timeout).map(Self::new)
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot create the database.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        db::open_in_memory().map(Self::new)
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Insert a user with an empty reward-state map.
    ///
    /// # Errors
    ///
    /// [`crate::ValidationError::InvalidEmail`] before any write when the
    /// email has no `@`; [`PerksError::Store`] if the insert fails.
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        validate_email(&new.email)?;
        let rewards = RewardStates::new();
        self.conn.execute(
            "INSERT INTO users (name, email, dob, rewards) VALUES (?1, ?2, ?3, ?4)",
            params![new.name, new.email, date_text(new.dob), rewards],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(user = id, "created user");
        Ok(User::from_parts(
            id,
            new.name.clone(),
            new.email.clone(),
            new.dob,
            rewards,
        ))
    }

    /// # Errors
    ///
    /// [`PerksError::NotFound`] when no user has this id.
    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                row_to_user,
            )
            .optional()?
            .ok_or_else(|| PerksError::not_found(EntityKind::User, id))
    }

    /// Typed lookup by id or email. With duplicate emails the lowest id wins.
    ///
    /// # Errors
    ///
    /// [`PerksError::NotFound`] when no user matches.
    pub fn find_user(&self, user: &UserRef) -> Result<User> {
        match user {
            UserRef::Id(id) => self.get_user(*id),
            UserRef::Email(email) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 ORDER BY id LIMIT 1"
                    ),
                    [email],
                    row_to_user,
                )
                .optional()?
                .ok_or_else(|| PerksError::not_found(EntityKind::User, user)),
        }
    }

    /// Projected point read by id or email, optionally with resolved rewards.
    ///
    /// # Errors
    ///
    /// [`PerksError::NotFound`] when no user matches.
    pub fn read_user(&self, user: &UserRef, selection: &UserSelection) -> Result<ProjectedRow> {
        let predicate = match user {
            UserRef::Id(id) => Predicate::Equals(UserField::Id, Value::Integer(*id)),
            UserRef::Email(email) => Predicate::Equals(UserField::Email, Value::Text(email.clone())),
        };
        build_user_query(selection, &predicate, Some(1))
            .run(&self.conn)?
            .into_iter()
            .next()
            .ok_or_else(|| PerksError::not_found(EntityKind::User, user))
    }

    /// Patch profile fields. The reward-state map is never touched here.
    ///
    /// # Errors
    ///
    /// [`crate::ValidationError::InvalidEmail`] for a new email without `@`;
    /// [`PerksError::NotFound`] when no user has this id.
    pub fn update_user(&self, id: i64, patch: &UserPatch) -> Result<User> {
        if let Some(ref email) = patch.email {
            validate_email(email)?;
        }

        let mut assignments: Vec<String> = Vec::new();
        let mut param_values: Vec<Value> = Vec::new();

        if let Some(ref name) = patch.name {
            param_values.push(Value::Text(name.clone()));
            assignments.push(format!("name = ?{}", param_values.len()));
        }
        if let Some(ref email) = patch.email {
            param_values.push(Value::Text(email.clone()));
            assignments.push(format!("email = ?{}", param_values.len()));
        }
        if let Some(dob) = patch.dob {
            param_values.push(date_text(dob).map_or(Value::Null, Value::Text));
            assignments.push(format!("dob = ?{}", param_values.len()));
        }

        if assignments.is_empty() {
            return self.get_user(id);
        }

        param_values.push(Value::Integer(id));
        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            assignments.join(", "),
            param_values.len()
        );
        let changed = self.conn.execute(&sql, params_from_iter(param_values.iter()))?;
        if changed == 0 {
            return Err(PerksError::not_found(EntityKind::User, id));
        }
        info!(user = id, fields = assignments.len(), "updated user");
        self.get_user(id)
    }

    /// # Errors
    ///
    /// [`PerksError::NotFound`] when no user has this id.
    pub fn delete_user(&self, id: i64) -> Result<()> {
        let deleted = self.conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(PerksError::not_found(EntityKind::User, id));
        }
        info!(user = id, "deleted user");
        Ok(())
    }

    /// Every user, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`PerksError::Store`] if the scan fails or a row is corrupt.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Substring search on one user column; no match is an empty vec.
    ///
    /// # Errors
    ///
    /// Returns [`PerksError::Store`] if the query fails.
    pub fn search_users(
        &self,
        column: UserSearchColumn,
        needle: &str,
        selection: &UserSelection,
    ) -> Result<Vec<ProjectedRow>> {
        let predicate = Predicate::Contains(column.field(), needle.to_string());
        Ok(build_user_query(selection, &predicate, None).run(&self.conn)?)
    }

    // -----------------------------------------------------------------------
    // Rewards
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`PerksError::Store`] if the insert fails.
    pub fn create_reward(&self, new: &NewReward) -> Result<Reward> {
        self.conn.execute(
            "INSERT INTO rewards (name, description, expires) VALUES (?1, ?2, ?3)",
            params![new.name, new.description, new.expires.timestamp_millis()],
        )?;
        let id = RewardId::new(self.conn.last_insert_rowid());
        info!(reward = %id, "created reward");
        Ok(Reward {
            id,
            name: new.name.clone(),
            description: new.description.clone(),
            expires: new.expires,
        })
    }

    /// # Errors
    ///
    /// [`PerksError::NotFound`] when no reward has this id.
    pub fn get_reward(&self, id: RewardId) -> Result<Reward> {
        self.conn
            .query_row(
                &format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"),
                [id.get()],
                row_to_reward,
            )
            .optional()?
            .ok_or_else(|| PerksError::not_found(EntityKind::Reward, id))
    }

    /// Projected point read by name; the lowest id wins on duplicates.
    ///
    /// # Errors
    ///
    /// [`PerksError::NotFound`] when no reward has this name.
    pub fn read_reward_by_name(
        &self,
        name: &str,
        projection: &Projection<RewardField>,
    ) -> Result<ProjectedRow> {
        let predicate = Predicate::Equals(RewardField::Name, Value::Text(name.to_string()));
        build_reward_query(projection, &predicate, Some(1))
            .run(&self.conn)?
            .into_iter()
            .next()
            .ok_or_else(|| PerksError::not_found(EntityKind::Reward, format!("\"{name}\"")))
    }

    /// # Errors
    ///
    /// [`PerksError::NotFound`] when no reward has this id.
    pub fn update_reward(&self, id: RewardId, patch: &RewardPatch) -> Result<Reward> {
        let mut assignments: Vec<String> = Vec::new();
        let mut param_values: Vec<Value> = Vec::new();

        if let Some(ref name) = patch.name {
            param_values.push(Value::Text(name.clone()));
            assignments.push(format!("name = ?{}", param_values.len()));
        }
        if let Some(ref description) = patch.description {
            param_values.push(Value::Text(description.clone()));
            assignments.push(format!("description = ?{}", param_values.len()));
        }
        if let Some(expires) = patch.expires {
            param_values.push(Value::Integer(expires.timestamp_millis()));
            assignments.push(format!("expires = ?{}", param_values.len()));
        }

        if assignments.is_empty() {
            return self.get_reward(id);
        }

        param_values.push(Value::Integer(id.get()));
        let sql = format!(
            "UPDATE rewards SET {} WHERE id = ?{}",
            assignments.join(", "),
            param_values.len()
        );
        let changed = self.conn.execute(&sql, params_from_iter(param_values.iter()))?;
        if changed == 0 {
            return Err(PerksError::not_found(EntityKind::Reward, id));
        }
        info!(reward = %id, fields = assignments.len(), "updated reward");
        self.get_reward(id)
    }

    /// Delete a reward and strip it from every user's map in one transaction.
    ///
    /// Returns how many users held the reward.
    ///
    /// # Errors
    ///
    /// [`PerksError::NotFound`] when no reward has this id.
    pub fn delete_reward(&mut self, id: RewardId) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let deleted = tx.execute("DELETE FROM rewards WHERE id = ?1", [id.get()])?;
        if deleted == 0 {
            return Err(PerksError::not_found(EntityKind::Reward, id));
        }

        let path = format!("$.\"{id}\"");
        let stripped = tx.execute(
            "UPDATE users SET rewards = json_remove(rewards, ?1) \
             WHERE json_type(rewards, ?1) IS NOT NULL",
            [&path],
        )?;
        tx.commit()?;

        info!(reward = %id, users = stripped, "deleted reward");
        Ok(stripped)
    }

    /// Every reward, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`PerksError::Store`] if the scan fails.
    pub fn list_rewards(&self) -> Result<Vec<Reward>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {REWARD_COLUMNS} FROM rewards ORDER BY id"))?;
        let rewards = stmt
            .query_map([], row_to_reward)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rewards)
    }

    /// Substring search on one reward column; no match is an empty vec.
    ///
    /// # Errors
    ///
    /// Returns [`PerksError::Store`] if the query fails.
    pub fn search_rewards(
        &self,
        column: RewardSearchColumn,
        needle: &str,
        projection: &Projection<RewardField>,
    ) -> Result<Vec<ProjectedRow>> {
        let predicate = Predicate::Contains(column.field(), needle.to_string());
        Ok(build_reward_query(projection, &predicate, None).run(&self.conn)?)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Mark `reward` applied (unclaimed) for `user`.
    ///
    /// # Errors
    ///
    /// [`PerksError::NotFound`] for a missing user or reward;
    /// [`crate::StateConflict::AlreadyApplied`] if the user already has it.
    pub fn apply_reward(&mut self, reward: RewardId, user: &UserRef) -> Result<TransitionOutcome> {
        self.transition(reward, user, Op::Apply)
    }

    /// Remove an applied, unclaimed reward from `user`.
    ///
    /// # Errors
    ///
    /// [`PerksError::NotFound`] for a missing user;
    /// [`crate::StateConflict::NothingToRevoke`] or
    /// [`crate::StateConflict::AlreadyClaimed`].
    pub fn revoke_reward(&mut self, reward: RewardId, user: &UserRef) -> Result<TransitionOutcome> {
        self.transition(reward, user, Op::Revoke)
    }

    /// Claim an applied reward for `user`, provided `now` is before expiry.
    ///
    /// # Errors
    ///
    /// [`PerksError::NotFound`] for a missing user or reward;
    /// [`crate::StateConflict::NotApplied`],
    /// [`crate::StateConflict::AlreadyClaimed`] or
    /// [`crate::StateConflict::Expired`].
    pub fn claim_reward(
        &mut self,
        reward: RewardId,
        user: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        self.transition(reward, user, Op::Claim { now })
    }

    fn transition(&mut self, reward: RewardId, user: &UserRef, op: Op) -> Result<TransitionOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (user_id, mut states) = load_states(&tx, user)?;
        let transition = match op {
            Op::Apply => {
                reward_expiry(&tx, reward)?;
                Transition::Apply
            }
            Op::Revoke => Transition::Revoke,
            Op::Claim { now } => Transition::Claim {
                expires: reward_expiry(&tx, reward)?,
                now,
            },
        };

        let status = states.transition(reward, transition)?;
        tx.execute(
            "UPDATE users SET rewards = ?1 WHERE id = ?2",
            params![states, user_id],
        )?;
        tx.commit()?;

        info!(user = user_id, reward = %reward, op = %transition, status = %status, "reward transition");
        Ok(TransitionOutcome {
            user: user_id,
            reward,
            status,
        })
    }
}

fn load_states(conn: &Connection, user: &UserRef) -> Result<(i64, RewardStates)> {
    let row: Option<(i64, RewardStates)> = match user {
        UserRef::Id(id) => conn
            .query_row(
                "SELECT id, rewards FROM users WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        UserRef::Email(email) => conn
            .query_row(
                "SELECT id, rewards FROM users WHERE email = ?1 ORDER BY id LIMIT 1",
                [email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
    };
    debug!(user = %user, found = row.is_some(), "loaded reward states");
    row.ok_or_else(|| PerksError::not_found(EntityKind::User, user))
}

fn reward_expiry(conn: &Connection, reward: RewardId) -> Result<DateTime<Utc>> {
    let millis: Option<i64> = conn
        .query_row(
            "SELECT expires FROM rewards WHERE id = ?1",
            [reward.get()],
            |row| row.get(0),
        )
        .optional()?;
    let millis = millis.ok_or_else(|| PerksError::not_found(EntityKind::Reward, reward))?;
    Ok(db::millis_to_datetime(0, millis)?)
}

fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}
