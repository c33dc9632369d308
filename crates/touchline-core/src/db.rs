// SQLite persistence: an in-process `DataStore` over the league tables, and
// a key-value `SessionStore` for the access grant.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::{Number, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::SessionStore;
use crate::store::{DataStore, Filter, Query, Row, Table};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS leagues (
    id          TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
    name        TEXT NOT NULL,
    description TEXT,
    logo_url    TEXT,
    rules       TEXT,
    start_date  TEXT,
    end_date    TEXT,
    status      TEXT DEFAULT 'setup',
    created_by  TEXT,
    created_at  TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at  TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS teams (
    id            TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
    name          TEXT NOT NULL,
    logo_url      TEXT,
    captain_name  TEXT,
    captain_email TEXT,
    league_id     TEXT NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    created_at    TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at    TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS players (
    id             TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
    name           TEXT NOT NULL,
    jersey_number  INTEGER,
    position       TEXT,
    photo_url      TEXT,
    team_id        TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    goals          INTEGER DEFAULT 0 CHECK (goals >= 0),
    assists        INTEGER DEFAULT 0 CHECK (assists >= 0),
    matches_played INTEGER DEFAULT 0 CHECK (matches_played >= 0),
    created_at     TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at     TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS matches (
    id          TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
    league_id   TEXT NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    team1_id    TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    team2_id    TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    team1_score INTEGER CHECK (team1_score >= 0),
    team2_score INTEGER CHECK (team2_score >= 0),
    status      TEXT DEFAULT 'scheduled'
                CHECK (status IN ('scheduled', 'ongoing', 'completed')),
    venue       TEXT,
    match_date  TEXT,
    created_at  TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at  TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CHECK (team1_id <> team2_id)
);

CREATE TABLE IF NOT EXISTS points_table (
    id              TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
    league_id       TEXT NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    team_id         TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    matches_played  INTEGER DEFAULT 0,
    wins            INTEGER DEFAULT 0,
    draws           INTEGER DEFAULT 0,
    losses          INTEGER DEFAULT 0,
    goals_for       INTEGER DEFAULT 0,
    goals_against   INTEGER DEFAULT 0,
    goal_difference INTEGER DEFAULT 0,
    points          INTEGER DEFAULT 0,
    updated_at      TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE(league_id, team_id)
);

CREATE TABLE IF NOT EXISTS admin_users (
    id         TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
    user_id    TEXT UNIQUE,
    email      TEXT NOT NULL,
    role       TEXT,
    created_at TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_teams_league ON teams(league_id);
CREATE INDEX IF NOT EXISTS idx_players_team ON players(team_id);
CREATE INDEX IF NOT EXISTS idx_matches_league ON matches(league_id);
";

/// Columns each table accepts in filters, orderings and written rows.
fn columns(table: Table) -> &'static [&'static str] {
    match table {
        Table::Leagues => &[
            "id", "name", "description", "logo_url", "rules", "start_date", "end_date",
            "status", "created_by", "created_at", "updated_at",
        ],
        Table::Teams => &[
            "id", "name", "logo_url", "captain_name", "captain_email", "league_id",
            "created_at", "updated_at",
        ],
        Table::Players => &[
            "id", "name", "jersey_number", "position", "photo_url", "team_id", "goals",
            "assists", "matches_played", "created_at", "updated_at",
        ],
        Table::Matches => &[
            "id", "league_id", "team1_id", "team2_id", "team1_score", "team2_score",
            "status", "venue", "match_date", "created_at", "updated_at",
        ],
        Table::PointsTable => &[
            "id", "league_id", "team_id", "matches_played", "wins", "draws", "losses",
            "goals_for", "goals_against", "goal_difference", "points", "updated_at",
        ],
        Table::AdminUsers => &["id", "user_id", "email", "role", "created_at"],
    }
}

fn check_column(table: Table, column: &str) -> Result<()> {
    if columns(table).contains(&column) {
        Ok(())
    } else {
        Err(Error::Constraint(format!(
            "unknown column `{column}` on {table}"
        )))
    }
}

/// Map a rusqlite failure onto the store error taxonomy.
fn store_error(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(code, message)
            if code.code == ErrorCode::ConstraintViolation =>
        {
            Error::Constraint(message.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => Error::Transport(e.to_string()),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Compile a filter tree into a SQL condition, appending bound values.
fn compile_filter(table: Table, filter: &Filter, args: &mut Vec<SqlValue>) -> Result<String> {
    match filter {
        Filter::Eq(column, value) => {
            check_column(table, column)?;
            if value.is_null() {
                return Ok(format!("\"{column}\" IS NULL"));
            }
            args.push(to_sql(value));
            Ok(format!("\"{column}\" = ?"))
        }
        Filter::IsNull(column) => {
            check_column(table, column)?;
            Ok(format!("\"{column}\" IS NULL"))
        }
        Filter::In(column, values) => {
            check_column(table, column)?;
            if values.is_empty() {
                return Ok("0".to_string());
            }
            args.extend(values.iter().map(to_sql));
            let marks = vec!["?"; values.len()].join(", ");
            Ok(format!("\"{column}\" IN ({marks})"))
        }
        Filter::And(parts) => join_filters(table, parts, " AND ", "1", args),
        Filter::Or(parts) => join_filters(table, parts, " OR ", "0", args),
    }
}

/// An empty group is the identity of its operator.
fn join_filters(
    table: Table,
    parts: &[Filter],
    op: &str,
    empty: &str,
    args: &mut Vec<SqlValue>,
) -> Result<String> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let mut compiled = Vec::with_capacity(parts.len());
    for part in parts {
        compiled.push(compile_filter(table, part, args)?);
    }
    Ok(format!("({})", compiled.join(op)))
}

fn read_rows(stmt: &mut rusqlite::Statement<'_>, args: Vec<SqlValue>) -> Result<Vec<Row>> {
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map(params_from_iter(args), |row| {
            let mut out = Row::new();
            for (i, name) in names.iter().enumerate() {
                out.insert(name.clone(), from_sql(row.get_ref(i)?));
            }
            Ok(out)
        })
        .map_err(store_error)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(store_error)?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite-backed league store. Pass `":memory:"` for an ephemeral database
/// (useful for tests).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_error)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(store_error)?;

        conn.execute_batch(SCHEMA).map_err(store_error)?;
        debug!("League store opened at {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn select_sync(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        let mut args = Vec::new();
        let mut sql = format!("SELECT * FROM {table}");

        if !query.filters.is_empty() {
            let condition = compile_filter(table, &Filter::And(query.filters.clone()), &mut args)?;
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }

        if !query.order.is_empty() {
            let mut terms = Vec::with_capacity(query.order.len());
            for order in &query.order {
                check_column(table, &order.column)?;
                // Match Postgres defaults: NULLs sort as the largest value.
                let direction = if order.ascending {
                    "ASC NULLS LAST"
                } else {
                    "DESC NULLS FIRST"
                };
                terms.push(format!("\"{}\" {direction}", order.column));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(store_error)?;
        read_rows(&mut stmt, args)
    }

    fn insert_sync(&self, table: Table, row: Row) -> Result<Row> {
        let mut names = Vec::with_capacity(row.len());
        let mut args = Vec::with_capacity(row.len());
        for (column, value) in &row {
            check_column(table, column)?;
            names.push(format!("\"{column}\""));
            args.push(to_sql(value));
        }

        let sql = if names.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING *")
        } else {
            let marks = vec!["?"; names.len()].join(", ");
            format!(
                "INSERT INTO {table} ({}) VALUES ({marks}) RETURNING *",
                names.join(", ")
            )
        };

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(store_error)?;
        read_rows(&mut stmt, args)?
            .pop()
            .ok_or_else(|| Error::Transport(format!("insert into {table} returned no row")))
    }

    fn update_sync(&self, table: Table, id: &str, patch: Row) -> Result<Row> {
        if patch.is_empty() {
            let query = Query::new().filter(Filter::eq("id", id)).limit(1);
            return self
                .select_sync(table, &query)?
                .pop()
                .ok_or_else(|| Error::not_found(table.entity(), id));
        }

        let mut sets = Vec::with_capacity(patch.len());
        let mut args = Vec::with_capacity(patch.len() + 1);
        for (column, value) in &patch {
            check_column(table, column)?;
            sets.push(format!("\"{column}\" = ?"));
            args.push(to_sql(value));
        }
        args.push(SqlValue::Text(id.to_string()));

        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ? RETURNING *",
            sets.join(", ")
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(store_error)?;
        read_rows(&mut stmt, args)?
            .pop()
            .ok_or_else(|| Error::not_found(table.entity(), id))
    }

    fn delete_sync(&self, table: Table, id: &str) -> Result<()> {
        let conn = self.conn();
        let affected = conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])
            .map_err(store_error)?;
        if affected == 0 {
            return Err(Error::not_found(table.entity(), id));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        self.select_sync(table, query)
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row> {
        self.insert_sync(table, row)
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row> {
        self.update_sync(table, id, patch)
    }

    async fn delete(&self, table: Table, id: &str) -> Result<()> {
        self.delete_sync(table, id)
    }
}

// ---------------------------------------------------------------------------
// SqliteSessionStore
// ---------------------------------------------------------------------------

/// Key-value session storage in its own SQLite file, so a console session
/// survives between invocations of the binary.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_error)?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS session_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
             );",
        )
        .map_err(store_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("session database mutex poisoned")
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM session_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_error)
    }

    /// Uses INSERT OR REPLACE so repeated saves overwrite the previous value.
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO session_state (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(store_error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM session_state WHERE key = ?1", params![key])
            .map_err(store_error)?;
        Ok(())
    }
}
