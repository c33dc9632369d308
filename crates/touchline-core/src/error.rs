// Error taxonomy shared by the store backends, the standings engine and the
// access resolver.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A referenced league, team, player or match row is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The store rejected the operation (row-level policy, missing admin
    /// rights on the selected league, anonymous write).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The store could not be reached or failed internally.
    #[error("transport error: {0}")]
    Transport(String),

    /// The store rejected a write because it breaks a table constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("match {match_id} references team {team_id} outside the league")]
    InvalidMatchReference { match_id: String, team_id: String },

    #[error("league not found: {0}")]
    LeagueNotFound(String),

    #[error("no league selected")]
    NoLeagueSelected,

    /// A request that is well-formed but makes no sense for the current
    /// data (a team playing itself, starting a finished match).
    #[error("invalid request: {0}")]
    Validation(String),

    /// A row came back from the store in a shape the typed model can't read.
    #[error("invalid {table} row: {message}")]
    InvalidRow {
        table: &'static str,
        message: String,
    },
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }
}
