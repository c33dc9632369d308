// Generic data store contract: select / insert / update / delete over the
// league tables, with rows carried as JSON objects.
//
// Backends: `db::SqliteStore` (in-process) and the PostgREST client in the
// app crate. Typed access goes through `repo::Repository`.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A single table row as returned by the store.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Leagues,
    Teams,
    Players,
    Matches,
    PointsTable,
    AdminUsers,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Leagues,
        Table::Teams,
        Table::Players,
        Table::Matches,
        Table::PointsTable,
        Table::AdminUsers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Leagues => "leagues",
            Table::Teams => "teams",
            Table::Players => "players",
            Table::Matches => "matches",
            Table::PointsTable => "points_table",
            Table::AdminUsers => "admin_users",
        }
    }

    /// Singular noun used in `NotFound` errors.
    pub fn entity(&self) -> &'static str {
        match self {
            Table::Leagues => "league",
            Table::Teams => "team",
            Table::Players => "player",
            Table::Matches => "match",
            Table::PointsTable => "points table row",
            Table::AdminUsers => "admin user",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    IsNull(String),
    In(String, Vec<Value>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn is_null(column: &str) -> Self {
        Filter::IsNull(column.to_string())
    }

    pub fn in_list<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Filters are combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The value of a top-level `id = ...` filter, if the query has one.
    pub fn id_filter(&self) -> Option<&str> {
        self.filters.iter().find_map(|f| match f {
            Filter::Eq(column, Value::String(id)) if column == "id" => Some(id.as_str()),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Remote table client. Every call is one independent request: it resolves
/// with data, fails with `NotFound` for an absent row, or fails with a
/// transport, permission or constraint error. No retries.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>>;

    /// Insert one row and return it as stored (generated id, defaults).
    async fn insert(&self, table: Table, row: Row) -> Result<Row>;

    /// Apply `patch` to the row with `id` and return the updated row.
    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row>;

    async fn delete(&self, table: Table, id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

pub fn to_row<T: Serialize>(table: Table, value: &T) -> Result<Row> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::InvalidRow {
            table: table.as_str(),
            message: format!("expected an object, got {other}"),
        }),
        Err(e) => Err(Error::InvalidRow {
            table: table.as_str(),
            message: e.to_string(),
        }),
    }
}

pub fn from_row<T: DeserializeOwned>(table: Table, row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| Error::InvalidRow {
        table: table.as_str(),
        message: e.to_string(),
    })
}

pub fn from_rows<T: DeserializeOwned>(table: Table, rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(|row| from_row(table, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_builder_collects_filters_and_order() {
        let q = Query::new()
            .filter(Filter::eq("league_id", "l1"))
            .filter(Filter::is_null("user_id"))
            .order_by("name", true)
            .limit(5);
        assert_eq!(q.filters.len(), 2);
        assert_eq!(
            q.order,
            vec![Order {
                column: "name".into(),
                ascending: true
            }]
        );
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn id_filter_finds_top_level_id() {
        let q = Query::new()
            .filter(Filter::eq("status", "completed"))
            .filter(Filter::eq("id", "m7"));
        assert_eq!(q.id_filter(), Some("m7"));
        assert_eq!(Query::new().id_filter(), None);
    }

    #[test]
    fn from_row_reports_table_on_bad_shape() {
        let row = json!({ "id": 5 }).as_object().cloned().unwrap();
        let err = from_row::<crate::model::Team>(Table::Teams, row).unwrap_err();
        assert!(matches!(err, Error::InvalidRow { table: "teams", .. }));
    }
}
