//! Canonical SQLite schema for perks.
//!
//! - `users` holds profile fields plus the `rewards` JSON object mapping
//!   reward id to claimed flag
//! - `rewards` is the catalog; `expires` is milliseconds since the Unix epoch
//! - `store_meta` tracks the applied schema version

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    dob TEXT CHECK (dob IS NULL OR date(dob) = dob),
    rewards TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(rewards))
);

CREATE TABLE IF NOT EXISTS rewards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    expires INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: alternate-key and search-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_users_email
    ON users(email, id);

CREATE INDEX IF NOT EXISTS idx_rewards_name
    ON rewards(name, id);
";

/// Indexes expected after all migrations have run.
pub const REQUIRED_INDEXES: &[&str] = &["idx_users_email", "idx_rewards_name"];
