//! Projection query builder.
//!
//! Turns a validated field selection and a predicate into one parameterized
//! read query. Column names are spliced into SQL text only from field
//! descriptors; every caller-supplied value is a bound parameter.
//!
//! Rows come back as JSON objects keyed by field name, decoded per
//! [`FieldType`]. For users, the optional `rewards_resolved` column is a
//! correlated sub-query that walks the reward-state map and inner-joins each
//! key against the reward catalog, so ids with no catalog row drop out.

use rusqlite::{
    Connection, Row, params_from_iter,
    types::{Type, Value},
};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::{millis_to_datetime, parse_date};
use crate::fields::{
    Field, FieldType, Projection, RewardField, UserField, UserSelection, output_names,
};
use crate::model::{Reward, RewardId, RewardStates, User};

pub use crate::fields::RESOLVED_FIELD;

/// A projected row: field name to JSON value.
pub type ProjectedRow = Map<String, JsonValue>;

const RESOLVED_REWARDS_SQL: &str = "(SELECT json_group_object(j.key, json_object(\
     'name', cat.name, \
     'description', cat.description, \
     'claimed', json(CASE WHEN j.value THEN 'true' ELSE 'false' END))) \
     FROM json_each(u.rewards) AS j \
     JOIN rewards AS cat ON cat.id = CAST(j.key AS INTEGER))";

/// Row filter applied by a projection query.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<F: Field> {
    All,
    /// Exact match on one column.
    Equals(F, Value),
    /// Literal substring match on one column (ASCII case-insensitive).
    Contains(F, String),
}

/// A built read query plus what is needed to decode its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadQuery<F: Field> {
    pub sql: String,
    pub params: Vec<Value>,
    fields: Vec<F>,
    resolve: bool,
}

impl<F: Field> ReadQuery<F> {
    /// Field names in output order, including the resolved column if any.
    #[must_use]
    pub fn output_names(&self) -> Vec<&'static str> {
        output_names(&self.fields, self.resolve)
    }

    /// Execute the query and decode every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails or a stored value cannot be
    /// decoded (for example a malformed reward-state blob).
    pub fn run(&self, conn: &Connection) -> rusqlite::Result<Vec<ProjectedRow>> {
        tracing::debug!(sql = %self.sql, params = self.params.len(), "projection query");

        let mut stmt = conn.prepare(&self.sql)?;
        let rows = stmt.query_map(params_from_iter(self.params.iter()), |row| {
            self.decode(row)
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn decode(&self, row: &Row<'_>) -> rusqlite::Result<ProjectedRow> {
        let mut out = ProjectedRow::new();
        for (idx, field) in self.fields.iter().enumerate() {
            out.insert(field.name().to_string(), decode_cell(row, idx, field.field_type())?);
        }
        if self.resolve {
            let idx = self.fields.len();
            let resolved = match row.get::<_, Option<String>>(idx)? {
                Some(text) => serde_json::from_str(&text)
                    .map_err(|err| conversion_failure(idx, Type::Text, err))?,
                None => JsonValue::Object(Map::new()),
            };
            out.insert(RESOLVED_FIELD.to_string(), resolved);
        }
        Ok(out)
    }
}

/// Build a user read: projected fields, optional resolve column, filter.
#[must_use]
pub fn build_user_query(
    selection: &UserSelection,
    predicate: &Predicate<UserField>,
    limit: Option<u32>,
) -> ReadQuery<UserField> {
    build(selection.projection.fields(), selection.resolve, predicate, limit)
}

/// Build a reward read. Rewards have no resolve variant.
#[must_use]
pub fn build_reward_query(
    projection: &Projection<RewardField>,
    predicate: &Predicate<RewardField>,
    limit: Option<u32>,
) -> ReadQuery<RewardField> {
    build(projection.fields(), false, predicate, limit)
}

fn build<F: Field>(
    fields: &[F],
    resolve: bool,
    predicate: &Predicate<F>,
    limit: Option<u32>,
) -> ReadQuery<F> {
    let alias = F::KIND.alias();

    let mut columns: Vec<String> = fields
        .iter()
        .map(|field| format!("{alias}.{}", field.name()))
        .collect();
    if resolve {
        columns.push(format!("{RESOLVED_REWARDS_SQL} AS {RESOLVED_FIELD}"));
    }

    let mut params: Vec<Value> = Vec::new();
    let where_clause = match predicate {
        Predicate::All => String::new(),
        Predicate::Equals(field, value) => {
            params.push(value.clone());
            format!(" WHERE {alias}.{} = ?{}", field.name(), params.len())
        }
        Predicate::Contains(field, needle) => {
            params.push(Value::Text(like_pattern(needle)));
            format!(
                " WHERE {alias}.{} LIKE ?{} ESCAPE '\\'",
                field.name(),
                params.len()
            )
        }
    };

    let limit_clause = limit.map(|limit| format!(" LIMIT {limit}")).unwrap_or_default();

    let sql = format!(
        "SELECT {} FROM {} AS {alias}{where_clause} ORDER BY {alias}.id{limit_clause}",
        columns.join(", "),
        F::KIND.table(),
    );

    ReadQuery {
        sql,
        params,
        fields: fields.to_vec(),
        resolve,
    }
}

/// Wrap `needle` for `LIKE ... ESCAPE '\'` so it matches as a literal substring.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn decode_cell(row: &Row<'_>, idx: usize, field_type: FieldType) -> rusqlite::Result<JsonValue> {
    match field_type {
        FieldType::Integer => Ok(JsonValue::from(row.get::<_, i64>(idx)?)),
        FieldType::Text => Ok(JsonValue::from(row.get::<_, String>(idx)?)),
        FieldType::Date => to_json(idx, Type::Text, &parse_date(idx, row.get(idx)?)?),
        FieldType::Timestamp => {
            to_json(idx, Type::Integer, &millis_to_datetime(idx, row.get(idx)?)?)
        }
        FieldType::RewardStates => to_json(idx, Type::Text, &row.get::<_, RewardStates>(idx)?),
    }
}

fn to_json<T: Serialize>(idx: usize, ty: Type, value: &T) -> rusqlite::Result<JsonValue> {
    serde_json::to_value(value).map_err(|err| conversion_failure(idx, ty, err))
}

fn conversion_failure(idx: usize, ty: Type, err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

// ---------------------------------------------------------------------------
// Typed rows
// ---------------------------------------------------------------------------

pub(crate) const USER_COLUMNS: &str = "id, name, email, dob, rewards";

pub(crate) const REWARD_COLUMNS: &str = "id, name, description, expires";

pub(crate) fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User::from_parts(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        parse_date(3, row.get(3)?)?,
        row.get(4)?,
    ))
}

pub(crate) fn row_to_reward(row: &Row<'_>) -> rusqlite::Result<Reward> {
    Ok(Reward {
        id: RewardId::new(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        expires: millis_to_datetime(3, row.get(3)?)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use rusqlite::params;
    use serde_json::json;

    fn test_db() -> Connection {
        open_in_memory().expect("open in-memory store")
    }

    fn insert_user(conn: &Connection, name: &str, email: &str, rewards: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (name, email, dob, rewards) VALUES (?1, ?2, '1990-04-01', ?3)",
            params![name, email, rewards],
        )
        .expect("insert user");
        conn.last_insert_rowid()
    }

    fn insert_reward_with_id(conn: &Connection, id: i64, name: &str, description: &str) {
        conn.execute(
            "INSERT INTO rewards (id, name, description, expires) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, description, 4_102_444_800_000_i64],
        )
        .expect("insert reward");
    }

    fn all_users() -> UserSelection {
        UserSelection::default()
    }

    #[test]
    fn empty_projection_lists_every_column_in_order() {
        let query = build_user_query(&all_users(), &Predicate::All, None);
        assert_eq!(
            query.sql,
            "SELECT u.id, u.name, u.email, u.dob, u.rewards FROM users AS u ORDER BY u.id"
        );
        assert!(query.params.is_empty());
        assert_eq!(query.output_names(), ["id", "name", "email", "dob", "rewards"]);
    }

    #[test]
    fn equality_predicate_binds_value() {
        let selection = UserSelection::parse(&["id", "email"], false).expect("valid fields");
        let query = build_user_query(
            &selection,
            &Predicate::Equals(UserField::Email, Value::Text("a@b.c".into())),
            Some(1),
        );
        assert_eq!(
            query.sql,
            "SELECT u.id, u.email FROM users AS u WHERE u.email = ?1 ORDER BY u.id LIMIT 1"
        );
        assert_eq!(query.params, vec![Value::Text("a@b.c".into())]);
    }

    #[test]
    fn contains_predicate_escapes_wildcards() {
        let query = build_reward_query(
            &Projection::all(),
            &Predicate::Contains(RewardField::Description, "50%_off\\".into()),
            None,
        );
        assert!(query.sql.contains("r.description LIKE ?1 ESCAPE '\\'"));
        assert_eq!(query.params, vec![Value::Text("%50\\%\\_off\\\\%".into())]);
    }

    #[test]
    fn resolve_adds_one_subquery_column() {
        let selection = UserSelection::parse(&["id"], true).expect("valid fields");
        let query = build_user_query(&selection, &Predicate::All, None);
        assert!(query.sql.contains("json_each(u.rewards)"));
        assert!(query.sql.ends_with("AS rewards_resolved FROM users AS u ORDER BY u.id"));
        assert_eq!(query.output_names(), ["id", "rewards_resolved"]);
    }

    #[test]
    fn resolve_drops_dangling_reward_ids() {
        let conn = test_db();
        insert_reward_with_id(&conn, 7, "Welcome", "First login bonus");
        let id = insert_user(&conn, "Ada", "ada@example.com", r#"{"7":false,"9":true}"#);

        let selection = UserSelection::parse(&["id", "rewards"], true).expect("valid fields");
        let predicate = Predicate::Equals(UserField::Id, Value::Integer(id));
        let rows = build_user_query(&selection, &predicate, Some(1))
            .run(&conn)
            .expect("run query");

        assert_eq!(rows.len(), 1);
        let row = JsonValue::Object(rows[0].clone());
        assert_eq!(
            row,
            json!({
                "id": id,
                "rewards": {"7": false, "9": true},
                "rewards_resolved": {
                    "7": {"name": "Welcome", "description": "First login bonus", "claimed": false}
                }
            })
        );
    }

    #[test]
    fn resolve_on_empty_map_is_empty_object() {
        let conn = test_db();
        insert_user(&conn, "Bob", "bob@example.com", "{}");

        let selection = UserSelection::parse(&["name"], true).expect("valid fields");
        let rows = build_user_query(&selection, &Predicate::All, None)
            .run(&conn)
            .expect("run query");

        assert_eq!(rows[0]["rewards_resolved"], json!({}));
    }

    #[test]
    fn resolve_reports_claimed_flag() {
        let conn = test_db();
        insert_reward_with_id(&conn, 3, "Coffee", "One free coffee");
        insert_user(&conn, "Cy", "cy@example.com", r#"{"3":true}"#);

        let selection = UserSelection::parse::<&str>(&[], true).expect("valid fields");
        let rows = build_user_query(&selection, &Predicate::All, None)
            .run(&conn)
            .expect("run query");

        assert_eq!(rows[0]["rewards_resolved"]["3"]["claimed"], json!(true));
        assert_eq!(rows[0]["dob"], json!("1990-04-01"));
    }

    #[test]
    fn search_is_literal_and_case_insensitive() {
        let conn = test_db();
        insert_user(&conn, "Ada Lovelace", "ada@example.com", "{}");
        insert_user(&conn, "Adam", "adam@example.com", "{}");
        insert_user(&conn, "100% Real", "real@example.com", "{}");

        let names = |needle: &str| -> Vec<JsonValue> {
            let selection = UserSelection::parse(&["name"], false).expect("valid fields");
            build_user_query(
                &selection,
                &Predicate::Contains(UserField::Name, needle.into()),
                None,
            )
            .run(&conn)
            .expect("run query")
            .into_iter()
            .map(|row| row["name"].clone())
            .collect()
        };

        assert_eq!(names("ADA"), [json!("Ada Lovelace"), json!("Adam")]);
        assert_eq!(names("%"), [json!("100% Real")]);
        assert_eq!(names("_"), Vec::<JsonValue>::new());
        assert_eq!(names("zzz"), Vec::<JsonValue>::new());
    }

    #[test]
    fn reward_expiry_projects_as_timestamp() {
        let conn = test_db();
        insert_reward_with_id(&conn, 1, "Gift", "");

        let projection = Projection::parse(&["expires"]).expect("valid fields");
        let rows = build_reward_query(&projection, &Predicate::All, None)
            .run(&conn)
            .expect("run query");

        assert_eq!(rows[0]["expires"], json!("2100-01-01T00:00:00Z"));
    }

    #[test]
    fn corrupt_reward_blob_surfaces_as_conversion_failure() {
        let conn = test_db();
        insert_user(&conn, "Eve", "eve@example.com", r#"{"not-a-number":false}"#);

        let selection = UserSelection::parse(&["rewards"], false).expect("valid fields");
        let err = build_user_query(&selection, &Predicate::All, None)
            .run(&conn)
            .unwrap_err();
        assert!(matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(..)
        ));
    }

    #[test]
    fn typed_rows_decode() {
        let conn = test_db();
        insert_reward_with_id(&conn, 5, "Five", "desc");
        let id = insert_user(&conn, "Ann", "ann@example.com", r#"{"5":false}"#);

        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                row_to_user,
            )
            .expect("user row");
        assert_eq!(user.name, "Ann");
        assert_eq!(user.rewards().len(), 1);

        let reward = conn
            .query_row(
                &format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = 5"),
                [],
                row_to_reward,
            )
            .expect("reward row");
        assert_eq!(reward.id, RewardId::new(5));
        assert_eq!(reward.expires.timestamp_millis(), 4_102_444_800_000);
    }
}
