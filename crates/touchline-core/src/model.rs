// Typed rows for the six tables of the league store, plus the insert and
// patch payloads written back to it.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Status given to a league when it is first created.
pub const LEAGUE_STATUS_SETUP: &str = "setup";

/// Role string written to `admin_users` for league creators.
pub const ADMIN_ROLE: &str = "admin";

/// Nullable columns that the model reads as their default (counters as 0,
/// a missing match status as `Scheduled`).
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Leagues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub rules: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Free text: "setup", "active", "completed", ...
    pub status: Option<String>,
    /// User id of the account that created the league.
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLeague {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaguePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub captain_name: Option<String>,
    pub captain_email: Option<String>,
    pub league_id: String,
}

/// Insert payload for a team. The owning league is supplied separately by
/// the repository so an insert cannot point at someone else's league.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTeam {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captain_email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captain_email: Option<String>,
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub jersey_number: Option<u32>,
    pub position: Option<String>,
    pub photo_url: Option<String>,
    pub team_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub goals: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assists: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub matches_played: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub goals: u32,
    pub assists: u32,
    pub matches_played: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assists: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches_played: Option<u32>,
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Scheduled,
    Ongoing,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Ongoing => "ongoing",
            MatchStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub league_id: String,
    pub team1_id: String,
    pub team2_id: String,
    pub team1_score: Option<u32>,
    pub team2_score: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: MatchStatus,
    pub venue: Option<String>,
    pub match_date: Option<DateTime<Utc>>,
}

impl Match {
    /// The final score, if this match has produced a result. Matches that
    /// are not completed, or are missing either score, have none.
    pub fn result(&self) -> Option<(u32, u32)> {
        if self.status != MatchStatus::Completed {
            return None;
        }
        Some((self.team1_score?, self.team2_score?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMatch {
    pub team1_id: String,
    pub team2_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team1_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team2_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MatchStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_date: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Points table and admin roster
// ---------------------------------------------------------------------------

/// A persisted standings line in `points_table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsTableRow {
    pub id: String,
    pub league_id: String,
    pub team_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub matches_played: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub wins: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub draws: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub losses: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub goals_for: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub goals_against: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub goal_difference: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub points: u32,
}

/// An entry of the global admin roster. Entries without a `user_id` are
/// matched by email until the admin links an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    pub user_id: Option<String>,
    pub email: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAdminUser {
    pub user_id: Option<String>,
    pub email: String,
    pub role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn player_null_counters_read_as_zero() {
        let player: Player = serde_json::from_value(json!({
            "id": "p1",
            "name": "Ada",
            "jersey_number": null,
            "position": null,
            "photo_url": null,
            "team_id": "t1",
            "goals": null,
            "assists": 4,
        }))
        .unwrap();
        assert_eq!(player.goals, 0);
        assert_eq!(player.assists, 4);
        assert_eq!(player.matches_played, 0);
    }

    #[test]
    fn match_status_defaults_to_scheduled_when_null() {
        let m: Match = serde_json::from_value(json!({
            "id": "m1",
            "league_id": "l1",
            "team1_id": "a",
            "team2_id": "b",
            "team1_score": null,
            "team2_score": null,
            "status": null,
            "venue": null,
            "match_date": null,
        }))
        .unwrap();
        assert_eq!(m.status, MatchStatus::Scheduled);
        assert_eq!(m.result(), None);
    }

    #[test]
    fn result_requires_completed_status_and_both_scores() {
        let mut m = Match {
            id: "m1".into(),
            league_id: "l1".into(),
            team1_id: "a".into(),
            team2_id: "b".into(),
            team1_score: Some(2),
            team2_score: Some(1),
            status: MatchStatus::Ongoing,
            venue: None,
            match_date: None,
        };
        assert_eq!(m.result(), None);

        m.status = MatchStatus::Completed;
        assert_eq!(m.result(), Some((2, 1)));

        m.team2_score = None;
        assert_eq!(m.result(), None);
    }

    #[test]
    fn patch_skips_unset_fields() {
        let patch = MatchPatch {
            status: Some(MatchStatus::Ongoing),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "status": "ongoing" })
        );
    }
}
