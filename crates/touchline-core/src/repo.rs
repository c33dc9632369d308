// Typed access to the league tables on top of a `DataStore`.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::access::Identity;
use crate::error::{Error, Result};
use crate::model::{
    AdminUser, League, LeaguePatch, Match, MatchPatch, MatchStatus, NewAdminUser, NewLeague,
    NewMatch, NewPlayer, NewTeam, Player, PlayerPatch, PointsTableRow, Team, TeamPatch,
    ADMIN_ROLE, LEAGUE_STATUS_SETUP,
};
use crate::standings::StandingsRow;
use crate::store::{from_row, from_rows, to_row, DataStore, Filter, Query, Row, Table};

pub struct Repository<'a, S: DataStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DataStore + ?Sized> Repository<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    async fn find<T: serde::de::DeserializeOwned>(&self, table: Table, id: &str) -> Result<Option<T>> {
        let query = Query::new().filter(Filter::eq("id", id)).limit(1);
        let mut rows = self.store.select(table, &query).await?;
        match rows.pop() {
            Some(row) => Ok(Some(from_row(table, row)?)),
            None => Ok(None),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, table: Table, id: &str) -> Result<T> {
        self.find(table, id)
            .await?
            .ok_or_else(|| Error::not_found(table.entity(), id))
    }

    // ------------------------------------------------------------------
    // Leagues
    // ------------------------------------------------------------------

    /// All leagues, newest first.
    pub async fn list_leagues(&self) -> Result<Vec<League>> {
        let query = Query::new().order_by("created_at", false);
        from_rows(Table::Leagues, self.store.select(Table::Leagues, &query).await?)
    }

    pub async fn find_league(&self, id: &str) -> Result<Option<League>> {
        self.find(Table::Leagues, id).await
    }

    /// Insert a league in "setup" status, owned by `created_by`.
    pub async fn create_league(&self, league: &NewLeague, created_by: &str) -> Result<League> {
        let mut row = to_row(Table::Leagues, league)?;
        row.insert("status".into(), LEAGUE_STATUS_SETUP.into());
        row.insert("created_by".into(), created_by.into());
        let stored = self.store.insert(Table::Leagues, row).await?;
        from_row(Table::Leagues, stored)
    }

    /// Apply `patch`, stamping `updated_at`.
    pub async fn update_league(&self, id: &str, patch: &LeaguePatch) -> Result<League> {
        let patch = LeaguePatch {
            updated_at: Some(Utc::now()),
            ..patch.clone()
        };
        let row = to_row(Table::Leagues, &patch)?;
        from_row(Table::Leagues, self.store.update(Table::Leagues, id, row).await?)
    }

    pub async fn delete_league(&self, id: &str) -> Result<()> {
        self.store.delete(Table::Leagues, id).await
    }

    // ------------------------------------------------------------------
    // Admin roster
    // ------------------------------------------------------------------

    /// Roster entries that could match `identity`: linked by user id, or
    /// unlinked with the same email.
    pub async fn admin_entries_for(&self, identity: &Identity) -> Result<Vec<AdminUser>> {
        let mut candidates = vec![Filter::eq("user_id", identity.id.as_str())];
        if !identity.email.is_empty() {
            candidates.push(Filter::And(vec![
                Filter::is_null("user_id"),
                Filter::eq("email", identity.email.as_str()),
            ]));
        }
        let query = Query::new().filter(Filter::Or(candidates));
        from_rows(
            Table::AdminUsers,
            self.store.select(Table::AdminUsers, &query).await?,
        )
    }

    /// Make sure `identity` has a linked roster entry, adding one if needed.
    pub async fn ensure_admin(&self, identity: &Identity) -> Result<AdminUser> {
        let query = Query::new()
            .filter(Filter::eq("user_id", identity.id.as_str()))
            .limit(1);
        if let Some(row) = self.store.select(Table::AdminUsers, &query).await?.pop() {
            return from_row(Table::AdminUsers, row);
        }
        let entry = NewAdminUser {
            user_id: Some(identity.id.clone()),
            email: identity.email.clone(),
            role: Some(ADMIN_ROLE.to_string()),
        };
        let row = to_row(Table::AdminUsers, &entry)?;
        from_row(
            Table::AdminUsers,
            self.store.insert(Table::AdminUsers, row).await?,
        )
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    /// Teams of a league in name order.
    pub async fn list_teams(&self, league_id: &str) -> Result<Vec<Team>> {
        let query = Query::new()
            .filter(Filter::eq("league_id", league_id))
            .order_by("name", true);
        from_rows(Table::Teams, self.store.select(Table::Teams, &query).await?)
    }

    pub async fn get_team(&self, id: &str) -> Result<Team> {
        self.get(Table::Teams, id).await
    }

    pub async fn create_team(&self, league_id: &str, team: &NewTeam) -> Result<Team> {
        let mut row = to_row(Table::Teams, team)?;
        row.insert("league_id".into(), league_id.into());
        from_row(Table::Teams, self.store.insert(Table::Teams, row).await?)
    }

    pub async fn update_team(&self, id: &str, patch: &TeamPatch) -> Result<Team> {
        let row = to_row(Table::Teams, patch)?;
        from_row(Table::Teams, self.store.update(Table::Teams, id, row).await?)
    }

    pub async fn delete_team(&self, id: &str) -> Result<()> {
        self.store.delete(Table::Teams, id).await
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    /// Players belonging to any of `team_ids`, in name order.
    pub async fn list_players(&self, team_ids: &[String]) -> Result<Vec<Player>> {
        if team_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::new()
            .filter(Filter::in_list("team_id", team_ids.iter().map(String::as_str)))
            .order_by("name", true);
        from_rows(Table::Players, self.store.select(Table::Players, &query).await?)
    }

    pub async fn get_player(&self, id: &str) -> Result<Player> {
        self.get(Table::Players, id).await
    }

    pub async fn create_player(&self, team_id: &str, player: &NewPlayer) -> Result<Player> {
        let mut row = to_row(Table::Players, player)?;
        row.insert("team_id".into(), team_id.into());
        from_row(Table::Players, self.store.insert(Table::Players, row).await?)
    }

    pub async fn update_player(&self, id: &str, patch: &PlayerPatch) -> Result<Player> {
        let row = to_row(Table::Players, patch)?;
        from_row(Table::Players, self.store.update(Table::Players, id, row).await?)
    }

    pub async fn delete_player(&self, id: &str) -> Result<()> {
        self.store.delete(Table::Players, id).await
    }

    // ------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------

    /// Matches of a league by date, undated ones last.
    pub async fn list_matches(&self, league_id: &str) -> Result<Vec<Match>> {
        let query = Query::new()
            .filter(Filter::eq("league_id", league_id))
            .order_by("match_date", true);
        from_rows(Table::Matches, self.store.select(Table::Matches, &query).await?)
    }

    pub async fn get_match(&self, id: &str) -> Result<Match> {
        self.get(Table::Matches, id).await
    }

    pub async fn create_match(&self, league_id: &str, fixture: &NewMatch) -> Result<Match> {
        let mut row = to_row(Table::Matches, fixture)?;
        row.insert("league_id".into(), league_id.into());
        row.insert("status".into(), MatchStatus::Scheduled.as_str().into());
        from_row(Table::Matches, self.store.insert(Table::Matches, row).await?)
    }

    pub async fn update_match(&self, id: &str, patch: &MatchPatch) -> Result<Match> {
        let row = to_row(Table::Matches, patch)?;
        from_row(Table::Matches, self.store.update(Table::Matches, id, row).await?)
    }

    pub async fn delete_match(&self, id: &str) -> Result<()> {
        self.store.delete(Table::Matches, id).await
    }

    // ------------------------------------------------------------------
    // Points table
    // ------------------------------------------------------------------

    pub async fn points_table(&self, league_id: &str) -> Result<Vec<PointsTableRow>> {
        let query = Query::new()
            .filter(Filter::eq("league_id", league_id))
            .order_by("points", false)
            .order_by("goal_difference", false);
        from_rows(
            Table::PointsTable,
            self.store.select(Table::PointsTable, &query).await?,
        )
    }

    /// Rewrite the cached points table of a league so it mirrors `standings`
    /// exactly: existing team rows are updated, missing ones inserted, and
    /// rows for teams no longer in the table removed.
    pub async fn replace_points_table(
        &self,
        league_id: &str,
        standings: &[StandingsRow],
    ) -> Result<()> {
        let existing: HashMap<String, String> = self
            .points_table(league_id)
            .await?
            .into_iter()
            .map(|row| (row.team_id, row.id))
            .collect();

        for line in standings {
            let row = counters_row(line);
            match existing.get(&line.team_id) {
                Some(id) => {
                    self.store.update(Table::PointsTable, id, row).await?;
                }
                None => {
                    let mut row = row;
                    row.insert("league_id".into(), league_id.into());
                    row.insert("team_id".into(), line.team_id.as_str().into());
                    self.store.insert(Table::PointsTable, row).await?;
                }
            }
        }

        for (team_id, id) in &existing {
            if !standings.iter().any(|line| &line.team_id == team_id) {
                self.store.delete(Table::PointsTable, id).await?;
            }
        }

        debug!(
            "Points table for league {} rewritten with {} rows",
            league_id,
            standings.len()
        );
        Ok(())
    }
}

fn counters_row(line: &StandingsRow) -> Row {
    let mut row = Row::new();
    row.insert("matches_played".into(), Value::from(line.matches_played));
    row.insert("wins".into(), Value::from(line.wins));
    row.insert("draws".into(), Value::from(line.draws));
    row.insert("losses".into(), Value::from(line.losses));
    row.insert("goals_for".into(), Value::from(line.goals_for));
    row.insert("goals_against".into(), Value::from(line.goals_against));
    row.insert("goal_difference".into(), Value::from(line.goal_difference));
    row.insert("points".into(), Value::from(line.points));
    row.insert("updated_at".into(), Value::from(Utc::now().to_rfc3339()));
    row
}
