// Console orchestration: owns the store, the signed-in identity and the
// session grant, and gates every mutation on the grant.
//
// League selection is asynchronous. `select_league` spawns the resolution and
// returns at once; the outcome arrives on the resolution channel and is fed
// back through `handle_resolution`, where the session's generation counter
// drops anything a later selection has superseded.

use std::sync::Arc;

use futures_util::future::try_join;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use touchline_core::access::{resolve_access, AccessGrant, Identity};
use touchline_core::achievements::{self, Award, PlayerLine};
use touchline_core::model::{
    League, LeaguePatch, Match, MatchPatch, MatchStatus, NewLeague, NewMatch, NewPlayer, NewTeam,
    Player, PlayerPatch, Team, TeamPatch,
};
use touchline_core::repo::Repository;
use touchline_core::session::{AccessSession, Completion, SelectionTicket};
use touchline_core::standings::{self, StandingsRow};
use touchline_core::store::DataStore;
use touchline_core::{Error, Result};

use crate::auth::AuthState;
use crate::config::DisplayConfig;

/// Outcome of one spawned league resolution.
#[derive(Debug)]
pub struct ResolutionEvent {
    pub ticket: SelectionTicket,
    pub outcome: Result<AccessGrant>,
}

/// Counts shown on the league home screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub league_name: String,
    pub teams: usize,
    pub players: usize,
    pub scheduled: usize,
    pub ongoing: usize,
    pub completed: usize,
    pub leader: Option<StandingsRow>,
}

pub struct Console<S: DataStore + 'static> {
    store: Arc<S>,
    auth: AuthState,
    auth_rx: watch::Receiver<Option<Identity>>,
    session: AccessSession,
    display: DisplayConfig,
    resolution_tx: mpsc::Sender<ResolutionEvent>,
    resolution_rx: mpsc::Receiver<ResolutionEvent>,
}

impl<S: DataStore + 'static> Console<S> {
    pub fn new(store: Arc<S>, auth: AuthState, session: AccessSession, display: DisplayConfig) -> Self {
        let (resolution_tx, resolution_rx) = mpsc::channel(16);
        let auth_rx = auth.subscribe();
        Self {
            store,
            auth,
            auth_rx,
            session,
            display,
            resolution_tx,
            resolution_rx,
        }
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn session(&self) -> &AccessSession {
        &self.session
    }

    pub fn display(&self) -> &DisplayConfig {
        &self.display
    }

    fn repo(&self) -> Repository<'_, S> {
        Repository::new(self.store.as_ref())
    }

    // ------------------------------------------------------------------
    // League selection
    // ------------------------------------------------------------------

    /// Start resolving access to `league_id`. Any selection still in flight
    /// is superseded.
    pub fn select_league(&mut self, league_id: &str) -> SelectionTicket {
        let ticket = self.session.begin(league_id);
        let store = Arc::clone(&self.store);
        let identity = self.auth.current();
        let tx = self.resolution_tx.clone();
        let event_ticket = ticket.clone();

        tokio::spawn(async move {
            let outcome =
                resolve_access(store.as_ref(), identity.as_ref(), &event_ticket.league_id).await;
            // The console may have shut down; nothing left to apply to.
            let _ = tx
                .send(ResolutionEvent {
                    ticket: event_ticket,
                    outcome,
                })
                .await;
        });

        ticket
    }

    /// Wait for the next finished resolution.
    pub async fn next_resolution(&mut self) -> Option<ResolutionEvent> {
        self.resolution_rx.recv().await
    }

    /// Apply a finished resolution, or drop it if it is stale.
    pub fn handle_resolution(&mut self, event: ResolutionEvent) -> Result<Completion> {
        self.session.complete(&event.ticket, event.outcome)
    }

    /// Select a league and wait until its resolution has been applied.
    pub async fn select_league_and_wait(&mut self, league_id: &str) -> Result<AccessGrant> {
        let ticket = self.select_league(league_id);
        loop {
            let Some(event) = self.next_resolution().await else {
                return Err(Error::Transport("resolution channel closed".into()));
            };
            let ours = event.ticket == ticket;
            let completion = self.handle_resolution(event);
            if !ours {
                debug!("Skipped an earlier resolution while waiting for {}", league_id);
                continue;
            }
            return match completion? {
                Completion::Applied => self
                    .session
                    .grant()
                    .cloned()
                    .ok_or(Error::NoLeagueSelected),
                Completion::Stale => Err(Error::LeagueNotFound(league_id.to_string())),
            };
        }
    }

    pub fn exit_league(&mut self) -> Result<()> {
        self.session.clear()
    }

    /// Re-resolve the held grant if the identity changed since the last
    /// check. Returns the new grant when one was re-resolved.
    pub async fn refresh_identity(&mut self) -> Result<Option<AccessGrant>> {
        if !self.auth_rx.has_changed().unwrap_or(false) {
            return Ok(None);
        }
        self.auth_rx.borrow_and_update();

        let Some(league_id) = self.session.grant().map(|g| g.id.clone()) else {
            return Ok(None);
        };
        info!("Identity changed; re-resolving access to league {}", league_id);
        self.select_league_and_wait(&league_id).await.map(Some)
    }

    pub fn current_grant(&self) -> Option<&AccessGrant> {
        self.session.grant()
    }

    pub fn current_league_id(&self) -> Result<String> {
        self.session
            .grant()
            .map(|g| g.id.clone())
            .ok_or(Error::NoLeagueSelected)
    }

    /// The held grant, if it carries admin rights.
    pub fn require_admin(&self) -> Result<&AccessGrant> {
        let grant = self.session.grant().ok_or(Error::NoLeagueSelected)?;
        if !grant.is_admin() {
            warn!("Admin action refused on league {} ({})", grant.id, grant.reason());
            return Err(Error::PermissionDenied(format!(
                "admin rights required for league {}",
                grant.name
            )));
        }
        Ok(grant)
    }

    /// Admin grant for an arbitrary league: the held grant when it matches,
    /// a fresh resolution otherwise.
    async fn admin_for(&self, league_id: &str) -> Result<AccessGrant> {
        let grant = match self.session.grant() {
            Some(held) if held.id == league_id => held.clone(),
            _ => {
                let identity = self.auth.current();
                resolve_access(self.store.as_ref(), identity.as_ref(), league_id).await?
            }
        };
        if !grant.is_admin() {
            warn!("Admin action refused on league {} ({})", grant.id, grant.reason());
            return Err(Error::PermissionDenied(format!(
                "admin rights required for league {}",
                grant.name
            )));
        }
        Ok(grant)
    }

    fn admin_league_id(&self) -> Result<String> {
        self.require_admin().map(|g| g.id.clone())
    }

    // ------------------------------------------------------------------
    // Leagues
    // ------------------------------------------------------------------

    pub async fn list_leagues(&self) -> Result<Vec<League>> {
        self.repo().list_leagues().await
    }

    /// Create a league owned by the signed-in user and select it.
    pub async fn create_league(&mut self, league: &NewLeague) -> Result<League> {
        let who = self
            .auth
            .current()
            .ok_or_else(|| Error::PermissionDenied("sign in to create a league".into()))?;
        if league.name.trim().is_empty() {
            return Err(Error::Validation("league name must not be empty".into()));
        }

        // The creator is admin of the new league either way; a roster failure
        // only costs global rights.
        if let Err(e) = self.repo().ensure_admin(&who).await {
            warn!("Could not add {} to the admin roster: {}", who.email, e);
        }

        let created = self.repo().create_league(league, &who.id).await?;
        info!("Created league {} ({})", created.name, created.id);
        self.select_league_and_wait(&created.id).await?;
        Ok(created)
    }

    pub async fn update_league(&mut self, league_id: &str, patch: &LeaguePatch) -> Result<League> {
        self.admin_for(league_id).await?;
        let updated = self.repo().update_league(league_id, patch).await?;
        if self.session.grant().is_some_and(|g| g.id == league_id) {
            // Name and logo are part of the grant.
            if let Err(e) = self.select_league_and_wait(league_id).await {
                warn!("League {} updated but its grant was not refreshed: {}", league_id, e);
            }
        }
        Ok(updated)
    }

    pub async fn delete_league(&mut self, league_id: &str) -> Result<()> {
        self.admin_for(league_id).await?;
        self.repo().delete_league(league_id).await?;
        info!("Deleted league {}", league_id);
        if self.session.grant().is_some_and(|g| g.id == league_id) {
            self.session.clear()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    pub async fn list_teams(&self) -> Result<Vec<Team>> {
        let league_id = self.current_league_id()?;
        self.repo().list_teams(&league_id).await
    }

    /// A team of the selected league. Teams elsewhere read as absent.
    async fn league_team(&self, league_id: &str, team_id: &str) -> Result<Team> {
        let team = self.repo().get_team(team_id).await?;
        if team.league_id != league_id {
            return Err(Error::not_found("team", team_id));
        }
        Ok(team)
    }

    pub async fn create_team(&self, team: &NewTeam) -> Result<Team> {
        let league_id = self.admin_league_id()?;
        if team.name.trim().is_empty() {
            return Err(Error::Validation("team name must not be empty".into()));
        }
        let created = self.repo().create_team(&league_id, team).await?;
        info!("Added team {} to league {}", created.name, league_id);
        Ok(created)
    }

    pub async fn update_team(&self, team_id: &str, patch: &TeamPatch) -> Result<Team> {
        let league_id = self.admin_league_id()?;
        self.league_team(&league_id, team_id).await?;
        self.repo().update_team(team_id, patch).await
    }

    /// Removing a team removes its players and matches, so the points table
    /// is rebuilt afterwards.
    pub async fn delete_team(&self, team_id: &str) -> Result<()> {
        let league_id = self.admin_league_id()?;
        self.league_team(&league_id, team_id).await?;
        self.repo().delete_team(team_id).await?;
        self.sync_points_table(&league_id).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    pub async fn list_players(&self) -> Result<Vec<Player>> {
        let team_ids: Vec<String> = self.list_teams().await?.into_iter().map(|t| t.id).collect();
        self.repo().list_players(&team_ids).await
    }

    async fn league_player(&self, league_id: &str, player_id: &str) -> Result<Player> {
        let player = self.repo().get_player(player_id).await?;
        match self.league_team(league_id, &player.team_id).await {
            Ok(_) => Ok(player),
            Err(Error::NotFound { .. }) => Err(Error::not_found("player", player_id)),
            Err(e) => Err(e),
        }
    }

    pub async fn create_player(&self, team_id: &str, player: &NewPlayer) -> Result<Player> {
        let league_id = self.admin_league_id()?;
        if player.name.trim().is_empty() {
            return Err(Error::Validation("player name must not be empty".into()));
        }
        let team = self.league_team(&league_id, team_id).await?;
        let created = self.repo().create_player(team_id, player).await?;
        info!("Added player {} to team {}", created.name, team.name);
        Ok(created)
    }

    pub async fn update_player(&self, player_id: &str, patch: &PlayerPatch) -> Result<Player> {
        let league_id = self.admin_league_id()?;
        self.league_player(&league_id, player_id).await?;
        self.repo().update_player(player_id, patch).await
    }

    pub async fn delete_player(&self, player_id: &str) -> Result<()> {
        let league_id = self.admin_league_id()?;
        self.league_player(&league_id, player_id).await?;
        self.repo().delete_player(player_id).await
    }

    // ------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------

    pub async fn list_matches(&self) -> Result<Vec<Match>> {
        let league_id = self.current_league_id()?;
        self.repo().list_matches(&league_id).await
    }

    async fn league_match(&self, league_id: &str, match_id: &str) -> Result<Match> {
        let fixture = self.repo().get_match(match_id).await?;
        if fixture.league_id != league_id {
            return Err(Error::not_found("match", match_id));
        }
        Ok(fixture)
    }

    pub async fn schedule_match(&self, fixture: &NewMatch) -> Result<Match> {
        let league_id = self.admin_league_id()?;
        if fixture.team1_id == fixture.team2_id {
            return Err(Error::Validation("a team cannot play itself".into()));
        }
        let (home, away) = try_join(
            self.league_team(&league_id, &fixture.team1_id),
            self.league_team(&league_id, &fixture.team2_id),
        )
        .await?;
        let created = self.repo().create_match(&league_id, fixture).await?;
        info!("Scheduled {} vs {} ({})", home.name, away.name, created.id);
        Ok(created)
    }

    pub async fn start_match(&self, match_id: &str) -> Result<Match> {
        let league_id = self.admin_league_id()?;
        let fixture = self.league_match(&league_id, match_id).await?;
        if fixture.status != MatchStatus::Scheduled {
            return Err(Error::Validation(format!(
                "match {} is {}, only scheduled matches can start",
                match_id, fixture.status
            )));
        }
        let patch = MatchPatch {
            status: Some(MatchStatus::Ongoing),
            ..Default::default()
        };
        self.repo().update_match(match_id, &patch).await
    }

    /// Record the final score and rebuild the points table.
    pub async fn record_result(
        &self,
        match_id: &str,
        team1_score: u32,
        team2_score: u32,
    ) -> Result<Match> {
        let league_id = self.admin_league_id()?;
        self.league_match(&league_id, match_id).await?;
        let patch = MatchPatch {
            team1_score: Some(team1_score),
            team2_score: Some(team2_score),
            status: Some(MatchStatus::Completed),
            ..Default::default()
        };
        let updated = self.repo().update_match(match_id, &patch).await?;
        info!(
            "Result recorded for match {}: {}-{}",
            match_id, team1_score, team2_score
        );
        self.sync_points_table(&league_id).await;
        Ok(updated)
    }

    pub async fn delete_match(&self, match_id: &str) -> Result<()> {
        let league_id = self.admin_league_id()?;
        self.league_match(&league_id, match_id).await?;
        self.repo().delete_match(match_id).await?;
        self.sync_points_table(&league_id).await;
        Ok(())
    }

    /// Rewrite the cached points table from match history. Runs after the
    /// match or team write has landed, so a failure here is logged and left
    /// for the next sync; standings are recomputed from history anyway.
    async fn sync_points_table(&self, league_id: &str) {
        let synced = async {
            let rows = self.standings_for(league_id).await?;
            self.repo().replace_points_table(league_id, &rows).await?;
            Ok::<_, Error>(rows.len())
        };
        match synced.await {
            Ok(count) => info!("Points table of league {} synced ({} teams)", league_id, count),
            Err(e) => warn!("Points table of league {} left stale: {}", league_id, e),
        }
    }

    // ------------------------------------------------------------------
    // Read models
    // ------------------------------------------------------------------

    async fn standings_for(&self, league_id: &str) -> Result<Vec<StandingsRow>> {
        let repo = self.repo();
        let (teams, matches) =
            try_join(repo.list_teams(league_id), repo.list_matches(league_id)).await?;
        standings::compute_standings(&teams, &matches)
    }

    /// Standings of the selected league, recomputed from match history.
    pub async fn standings(&self) -> Result<Vec<StandingsRow>> {
        let league_id = self.current_league_id()?;
        self.standings_for(&league_id).await
    }

    /// Standings as last written to the points table, ranked.
    pub async fn cached_standings(&self) -> Result<Vec<StandingsRow>> {
        let league_id = self.current_league_id()?;
        let repo = self.repo();
        let (teams, cached) =
            try_join(repo.list_teams(&league_id), repo.points_table(&league_id)).await?;

        let rows = cached
            .into_iter()
            .map(|row| {
                let team_name = teams
                    .iter()
                    .find(|t| t.id == row.team_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                StandingsRow {
                    team_id: row.team_id,
                    team_name,
                    matches_played: row.matches_played,
                    wins: row.wins,
                    draws: row.draws,
                    losses: row.losses,
                    goals_for: row.goals_for,
                    goals_against: row.goals_against,
                    goal_difference: row.goal_difference,
                    points: row.points,
                }
            })
            .collect();
        Ok(standings::rank(rows))
    }

    pub async fn achievements(&self) -> Result<Vec<Award>> {
        let teams = self.list_teams().await?;
        let team_ids: Vec<String> = teams.iter().map(|t| t.id.clone()).collect();
        let players = self.repo().list_players(&team_ids).await?;

        let lines: Vec<PlayerLine> = players
            .into_iter()
            .map(|p| PlayerLine {
                team_name: teams
                    .iter()
                    .find(|t| t.id == p.team_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_default(),
                player_id: p.id,
                player_name: p.name,
                goals: p.goals,
                assists: p.assists,
                matches_played: p.matches_played,
            })
            .collect();
        Ok(achievements::achievements(&lines))
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let grant = self.session.grant().ok_or(Error::NoLeagueSelected)?;
        let league_name = grant.name.clone();
        let league_id = grant.id.clone();

        let repo = self.repo();
        let (teams, matches) =
            try_join(repo.list_teams(&league_id), repo.list_matches(&league_id)).await?;
        let team_ids: Vec<String> = teams.iter().map(|t| t.id.clone()).collect();
        let players = repo.list_players(&team_ids).await?;
        let table = standings::compute_standings(&teams, &matches)?;

        let count = |status: MatchStatus| matches.iter().filter(|m| m.status == status).count();
        Ok(DashboardSummary {
            league_name,
            teams: teams.len(),
            players: players.len(),
            scheduled: count(MatchStatus::Scheduled),
            ongoing: count(MatchStatus::Ongoing),
            completed: count(MatchStatus::Completed),
            leader: table.into_iter().next(),
        })
    }
}
