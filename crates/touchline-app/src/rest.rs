// Hosted store client speaking the PostgREST dialect.
//
// Every `DataStore` call is exactly one HTTP request against
// `{base}/rest/v1/{table}`. Filters become query parameters (`col=eq.v`,
// `col=is.null`, `or=(...)`), writes ask for the stored row back with
// `Prefer: return=representation`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use touchline_core::store::{DataStore, Filter, Query, Row, Table};
use touchline_core::{Error, Result};

/// Store client bound to one project URL and key.
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
        }
    }

    /// Act as a signed-in user; row-level policies see this token.
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, table: Table, id: Option<&str>, request: RequestBuilder) -> Result<Vec<Row>> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !status.is_success() {
            let err = classify(table, id, status, &body);
            warn!("Request on {} failed with {}: {}", table, status, err);
            return Err(err);
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|e| Error::InvalidRow {
            table: table.as_str(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl DataStore for RestStore {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        let Some(params) = encode_query(query) else {
            debug!("Query on {} can match nothing; skipping request", table);
            return Ok(Vec::new());
        };
        let request = self.request(Method::GET, table).query(&params);
        self.send(table, query.id_filter(), request).await
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row> {
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&row);
        self.send(table, None, request)
            .await?
            .pop()
            .ok_or_else(|| Error::Transport(format!("insert into {table} returned no row")))
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row> {
        let request = self
            .request(Method::PATCH, table)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send(table, Some(id), request)
            .await?
            .pop()
            .ok_or_else(|| Error::not_found(table.entity(), id))
    }

    async fn delete(&self, table: Table, id: &str) -> Result<()> {
        let request = self
            .request(Method::DELETE, table)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        if self.send(table, Some(id), request).await?.is_empty() {
            return Err(Error::not_found(table.entity(), id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Map a failed response onto the store error taxonomy. PostgREST reports
/// Postgres error codes in the body: 42501 is a policy rejection, class 23 a
/// constraint violation.
pub fn classify(table: Table, id: Option<&str>, status: StatusCode, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(String::from)
    };
    let code = field("code").unwrap_or_default();
    let message = field("message").unwrap_or_else(|| body.trim().to_string());

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || code == "42501" {
        return Error::PermissionDenied(message);
    }
    if status == StatusCode::CONFLICT || code.starts_with("23") {
        return Error::Constraint(message);
    }
    if status == StatusCode::NOT_FOUND {
        return Error::not_found(table.entity(), id.unwrap_or_default());
    }
    Error::Transport(format!("HTTP {}: {}", status.as_u16(), message))
}

// ---------------------------------------------------------------------------
// Query encoding
// ---------------------------------------------------------------------------

/// Drop branches that can never match. `None` means the whole filter can't.
fn simplify(filter: &Filter) -> Option<Filter> {
    match filter {
        Filter::In(_, values) if values.is_empty() => None,
        Filter::Or(parts) => {
            let kept: Vec<Filter> = parts.iter().filter_map(simplify).collect();
            if kept.is_empty() {
                None
            } else {
                Some(Filter::Or(kept))
            }
        }
        Filter::And(parts) => parts
            .iter()
            .map(simplify)
            .collect::<Option<Vec<_>>>()
            .map(Filter::And),
        other => Some(other.clone()),
    }
}

/// Top-level `eq` takes the rest of the parameter verbatim.
fn raw_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Inside `in.(...)` and `or=(...)` strings are double-quoted so reserved
/// characters survive.
fn quoted_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}

fn in_list(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(quoted_value).collect();
    format!("in.({})", items.join(","))
}

/// Render a filter in the nested `col.op.value` form used inside logic trees.
fn nested(filter: &Filter) -> String {
    match filter {
        Filter::Eq(column, Value::Null) | Filter::IsNull(column) => format!("{column}.is.null"),
        Filter::Eq(column, value) => format!("{column}.eq.{}", quoted_value(value)),
        Filter::In(column, values) => format!("{column}.{}", in_list(values)),
        // Always true; every table has a non-null primary key.
        Filter::And(parts) if parts.is_empty() => "id.not.is.null".to_string(),
        Filter::And(parts) => format!("and({})", join_nested(parts)),
        Filter::Or(parts) => format!("or({})", join_nested(parts)),
    }
}

fn join_nested(parts: &[Filter]) -> String {
    parts.iter().map(nested).collect::<Vec<_>>().join(",")
}

fn top_level(filter: &Filter, params: &mut Vec<(String, String)>) {
    match filter {
        Filter::Eq(column, Value::Null) | Filter::IsNull(column) => {
            params.push((column.clone(), "is.null".into()))
        }
        Filter::Eq(column, value) => params.push((column.clone(), format!("eq.{}", raw_value(value)))),
        Filter::In(column, values) => params.push((column.clone(), in_list(values))),
        Filter::And(parts) => {
            for part in parts {
                top_level(part, params);
            }
        }
        Filter::Or(parts) => params.push(("or".into(), format!("({})", join_nested(parts)))),
    }
}

/// Query parameters for a select, or `None` when no row can match.
pub fn encode_query(query: &Query) -> Option<Vec<(String, String)>> {
    let filter = simplify(&Filter::And(query.filters.clone()))?;

    let mut params = vec![("select".to_string(), "*".to_string())];
    top_level(&filter, &mut params);

    if !query.order.is_empty() {
        let terms: Vec<String> = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect();
        params.push(("order".into(), terms.join(",")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".into(), limit.to_string()));
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Vec<&'a str> {
        params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    // ------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------

    #[test]
    fn simple_filters_order_and_limit() {
        let query = Query::new()
            .filter(Filter::eq("league_id", "l1"))
            .order_by("points", false)
            .order_by("goal_difference", false)
            .limit(10);
        let params = encode_query(&query).unwrap();
        assert_eq!(param(&params, "select"), ["*"]);
        assert_eq!(param(&params, "league_id"), ["eq.l1"]);
        assert_eq!(param(&params, "order"), ["points.desc,goal_difference.desc"]);
        assert_eq!(param(&params, "limit"), ["10"]);
    }

    #[test]
    fn admin_lookup_encodes_as_or_tree() {
        let query = Query::new().filter(Filter::Or(vec![
            Filter::eq("user_id", "u1"),
            Filter::And(vec![
                Filter::is_null("user_id"),
                Filter::eq("email", "u1@x.com"),
            ]),
        ]));
        let params = encode_query(&query).unwrap();
        assert_eq!(
            param(&params, "or"),
            ["(user_id.eq.\"u1\",and(user_id.is.null,email.eq.\"u1@x.com\"))"]
        );
    }

    #[test]
    fn in_list_quotes_strings() {
        let query = Query::new().filter(Filter::in_list("team_id", ["a,b", "c"]));
        let params = encode_query(&query).unwrap();
        assert_eq!(param(&params, "team_id"), ["in.(\"a,b\",\"c\")"]);
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let query = Query::new().filter(Filter::eq("match_date", Value::Null));
        let params = encode_query(&query).unwrap();
        assert_eq!(param(&params, "match_date"), ["is.null"]);
    }

    #[test]
    fn unsatisfiable_filters_skip_the_request() {
        let empty_in = Query::new().filter(Filter::In("id".into(), vec![]));
        assert!(encode_query(&empty_in).is_none());

        let empty_or = Query::new().filter(Filter::Or(vec![]));
        assert!(encode_query(&empty_or).is_none());

        let pruned = Query::new().filter(Filter::Or(vec![
            Filter::In("id".into(), vec![]),
            Filter::eq("id", "x"),
        ]));
        let params = encode_query(&pruned).unwrap();
        assert_eq!(param(&params, "or"), ["(id.eq.\"x\")"]);
    }

    // ------------------------------------------------------------------
    // Error mapping
    // ------------------------------------------------------------------

    #[test]
    fn policy_rejections_are_permission_denied() {
        let body = json!({ "code": "42501", "message": "new row violates row-level security policy" })
            .to_string();
        let err = classify(Table::Teams, None, StatusCode::BAD_REQUEST, &body);
        assert_eq!(
            err,
            Error::PermissionDenied("new row violates row-level security policy".into())
        );

        let err = classify(Table::Teams, None, StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn constraint_failures_are_reported_as_such() {
        let body = json!({ "code": "23503", "message": "violates foreign key constraint" }).to_string();
        let err = classify(Table::Matches, None, StatusCode::BAD_REQUEST, &body);
        assert!(matches!(err, Error::Constraint(_)));

        let err = classify(Table::AdminUsers, None, StatusCode::CONFLICT, "duplicate");
        assert_eq!(err, Error::Constraint("duplicate".into()));
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = classify(Table::Matches, Some("m1"), StatusCode::NOT_FOUND, "");
        assert_eq!(err, Error::not_found("match", "m1"));
    }

    #[test]
    fn everything_else_is_transport() {
        let err = classify(Table::Leagues, None, StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err, Error::Transport("HTTP 502: upstream down".into()));
    }
}
