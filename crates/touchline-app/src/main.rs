// Touchline console entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Parse the command line
// 3. Load config
// 4. Open the session store and restore the held grant
// 5. Establish the identity
// 6. Open the league store for the configured backend
// 7. Re-check the held grant, then run the command

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use tracing::{info, warn};

use touchline_app::app::Console;
use touchline_app::auth::{self, AuthState};
use touchline_app::config::{self, Backend, Config};
use touchline_app::render;
use touchline_app::rest::RestStore;
use touchline_core::db::{SqliteSessionStore, SqliteStore};
use touchline_core::model::{
    LeaguePatch, NewLeague, NewMatch, NewPlayer, NewTeam, PlayerPatch, TeamPatch,
};
use touchline_core::session::AccessSession;
use touchline_core::store::DataStore;
use touchline_core::Error;

#[derive(clap::Parser)]
#[clap(version, about = "Administration console for amateur sports leagues")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// List all leagues, newest first
    Leagues,
    /// Select a league and resolve your access to it
    Select { league_id: String },
    /// Leave the selected league
    Exit,
    /// Show the selected league and your role in it
    Whoami,
    /// Standings of the selected league
    Standings {
        /// Write CSV instead of a table
        #[clap(long)]
        csv: bool,
        /// Read the stored points table instead of recomputing
        #[clap(long)]
        cached: bool,
    },
    /// Top scorer, most assists and most active player
    Leaders,
    Matches,
    Teams,
    Players,
    /// League overview
    Summary,
    CreateLeague {
        name: String,
        #[clap(long)]
        description: Option<String>,
        #[clap(long)]
        rules: Option<String>,
        #[clap(long)]
        start: Option<NaiveDate>,
        #[clap(long)]
        end: Option<NaiveDate>,
    },
    /// Change a league's details (admin of that league)
    EditLeague {
        league_id: String,
        #[clap(flatten)]
        edits: LeagueEdits,
    },
    /// Delete a league with its teams, players and matches
    DeleteLeague { league_id: String },
    AddTeam {
        name: String,
        #[clap(long)]
        captain: Option<String>,
        #[clap(long)]
        captain_email: Option<String>,
    },
    EditTeam {
        team_id: String,
        #[clap(flatten)]
        edits: TeamEdits,
    },
    /// Remove a team with its players and matches
    RemoveTeam { team_id: String },
    AddPlayer {
        team_id: String,
        name: String,
        #[clap(long)]
        number: Option<u32>,
        #[clap(long)]
        position: Option<String>,
    },
    /// Change a player's details or season stats
    UpdatePlayer {
        player_id: String,
        #[clap(flatten)]
        edits: PlayerEdits,
    },
    RemovePlayer { player_id: String },
    /// Schedule a match between two teams of the selected league
    Schedule {
        team1_id: String,
        team2_id: String,
        #[clap(long)]
        venue: Option<String>,
        /// Kick-off as RFC 3339, e.g. 2025-03-09T14:30:00Z
        #[clap(long)]
        date: Option<DateTime<Utc>>,
    },
    /// Mark a scheduled match as ongoing
    Start { match_id: String },
    /// Record a final score
    Result {
        match_id: String,
        team1_score: u32,
        team2_score: u32,
    },
    RemoveMatch { match_id: String },
}

#[derive(clap::Args)]
struct LeagueEdits {
    #[clap(long)]
    name: Option<String>,
    #[clap(long)]
    description: Option<String>,
    #[clap(long)]
    rules: Option<String>,
    #[clap(long)]
    start: Option<NaiveDate>,
    #[clap(long)]
    end: Option<NaiveDate>,
    #[clap(long)]
    status: Option<String>,
}

impl LeagueEdits {
    fn into_patch(self) -> LeaguePatch {
        LeaguePatch {
            name: self.name,
            description: self.description,
            rules: self.rules,
            start_date: self.start,
            end_date: self.end,
            status: self.status,
            ..Default::default()
        }
    }
}

#[derive(clap::Args)]
struct TeamEdits {
    #[clap(long)]
    name: Option<String>,
    #[clap(long)]
    captain: Option<String>,
    #[clap(long)]
    captain_email: Option<String>,
}

impl TeamEdits {
    fn into_patch(self) -> TeamPatch {
        TeamPatch {
            name: self.name,
            captain_name: self.captain,
            captain_email: self.captain_email,
            ..Default::default()
        }
    }
}

#[derive(clap::Args)]
struct PlayerEdits {
    #[clap(long)]
    name: Option<String>,
    #[clap(long)]
    number: Option<u32>,
    #[clap(long)]
    position: Option<String>,
    #[clap(long)]
    goals: Option<u32>,
    #[clap(long)]
    assists: Option<u32>,
    /// Matches played
    #[clap(long)]
    played: Option<u32>,
}

impl PlayerEdits {
    fn into_patch(self) -> PlayerPatch {
        PlayerPatch {
            name: self.name,
            jersey_number: self.number,
            position: self.position,
            goals: self.goals,
            assists: self.assists,
            matches_played: self.played,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;

    // 2. Parse the command line
    let args = Args::parse();

    // 3. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!("Config loaded: backend={:?}", config.store.backend);

    // 4. Open the session store
    if let Some(parent) = config.session_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create session directory")?;
        }
    }
    let session_path = path_str(&config.session_path)?;
    let sessions = SqliteSessionStore::open(session_path).context("failed to open session store")?;
    let session = AccessSession::restore(Arc::new(sessions)).context("failed to restore session")?;

    // 5-6. Identity and store, per backend
    match config.store.backend {
        Backend::Sqlite => {
            let store = SqliteStore::open(&config.store.sqlite_path)
                .context("failed to open league database")?;
            info!("League database opened at {}", config.store.sqlite_path);
            let identity = auth::identity_from_config(&config.credentials);
            run(store, AuthState::new(identity), session, &config, args.command).await
        }
        Backend::Rest => {
            let api_key = config.credentials.api_key.clone().unwrap_or_default();
            let token = config.credentials.access_token.clone();
            let identity = match &token {
                Some(token) => Some(
                    auth::fetch_identity(&config.store.rest_url, &api_key, token)
                        .await
                        .context("failed to sign in")?,
                ),
                None => None,
            };
            let store = RestStore::new(&config.store.rest_url, &api_key).with_access_token(token);
            run(store, AuthState::new(identity), session, &config, args.command).await
        }
    }
}

async fn run<S: DataStore + 'static>(
    store: S,
    auth: AuthState,
    session: AccessSession,
    config: &Config,
    command: Command,
) -> anyhow::Result<()> {
    let mut console = Console::new(Arc::new(store), auth, session, config.display.clone());

    // 7. The stored grant was resolved for whoever was signed in last time.
    if let Some(league_id) = console.current_grant().map(|g| g.id.clone()) {
        match console.select_league_and_wait(&league_id).await {
            Ok(_) => {}
            Err(Error::LeagueNotFound(_)) => {
                warn!("Selected league {} no longer exists", league_id);
                console.exit_league()?;
            }
            Err(e) => warn!("Could not re-check access to {}: {}", league_id, e),
        }
    }

    let output = match command {
        Command::Leagues => render::leagues(&console.list_leagues().await?, console.display()),
        Command::Select { league_id } => {
            console.select_league_and_wait(&league_id).await?;
            render::grant(console.current_grant())
        }
        Command::Exit => {
            console.exit_league()?;
            render::grant(None)
        }
        Command::Whoami => render::grant(console.current_grant()),
        Command::Standings { csv, cached } => {
            let rows = if cached {
                console.cached_standings().await?
            } else {
                console.standings().await?
            };
            if csv {
                render::standings_csv(&rows)?
            } else {
                render::standings(&rows)
            }
        }
        Command::Leaders => render::awards(&console.achievements().await?),
        Command::Matches => {
            let (matches, teams) = (console.list_matches().await?, console.list_teams().await?);
            render::matches(&matches, &teams, console.display())
        }
        Command::Teams => render::teams(&console.list_teams().await?),
        Command::Players => {
            let (players, teams) = (console.list_players().await?, console.list_teams().await?);
            render::players(&players, &teams)
        }
        Command::Summary => render::summary(&console.dashboard_summary().await?),
        Command::CreateLeague {
            name,
            description,
            rules,
            start,
            end,
        } => {
            let league = NewLeague {
                name,
                description,
                rules,
                start_date: start,
                end_date: end,
                ..Default::default()
            };
            let created = console.create_league(&league).await?;
            format!("Created league {} ({})\n", created.name, created.id)
        }
        Command::EditLeague { league_id, edits } => {
            let updated = console.update_league(&league_id, &edits.into_patch()).await?;
            format!("Updated league {} ({})\n", updated.name, updated.id)
        }
        Command::DeleteLeague { league_id } => {
            console.delete_league(&league_id).await?;
            format!("Deleted league {league_id}\n")
        }
        Command::AddTeam {
            name,
            captain,
            captain_email,
        } => {
            let team = NewTeam {
                name,
                captain_name: captain,
                captain_email,
                ..Default::default()
            };
            let created = console.create_team(&team).await?;
            format!("Added team {} ({})\n", created.name, created.id)
        }
        Command::EditTeam { team_id, edits } => {
            let updated = console.update_team(&team_id, &edits.into_patch()).await?;
            format!("Updated team {} ({})\n", updated.name, updated.id)
        }
        Command::RemoveTeam { team_id } => {
            console.delete_team(&team_id).await?;
            format!("Removed team {team_id}\n")
        }
        Command::AddPlayer {
            team_id,
            name,
            number,
            position,
        } => {
            let player = NewPlayer {
                name,
                jersey_number: number,
                position,
                ..Default::default()
            };
            let created = console.create_player(&team_id, &player).await?;
            format!("Added player {} ({})\n", created.name, created.id)
        }
        Command::UpdatePlayer { player_id, edits } => {
            let updated = console.update_player(&player_id, &edits.into_patch()).await?;
            format!(
                "Updated player {}: {} goals, {} assists, {} played\n",
                updated.name, updated.goals, updated.assists, updated.matches_played
            )
        }
        Command::RemovePlayer { player_id } => {
            console.delete_player(&player_id).await?;
            format!("Removed player {player_id}\n")
        }
        Command::Schedule {
            team1_id,
            team2_id,
            venue,
            date,
        } => {
            let fixture = NewMatch {
                team1_id,
                team2_id,
                venue,
                match_date: date,
            };
            let created = console.schedule_match(&fixture).await?;
            format!("Scheduled match {}\n", created.id)
        }
        Command::Start { match_id } => {
            console.start_match(&match_id).await?;
            format!("Match {match_id} is under way\n")
        }
        Command::Result {
            match_id,
            team1_score,
            team2_score,
        } => {
            console
                .record_result(&match_id, team1_score, team2_score)
                .await?;
            render::standings(&console.standings().await?)
        }
        Command::RemoveMatch { match_id } => {
            console.delete_match(&match_id).await?;
            format!("Removed match {match_id}\n")
        }
    };

    print!("{output}");
    Ok(())
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .with_context(|| format!("path is not valid UTF-8: {}", path.display()))
}

/// Initialize tracing to log to a file (not the terminal, which carries
/// command output).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("touchline.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("touchline_app=info,touchline_core=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Args::try_parse_from(std::iter::once("touchline").chain(args.iter().copied()))
            .expect("arguments should parse")
            .command
    }

    #[test]
    fn update_player_sets_only_the_given_stats() {
        let Command::UpdatePlayer { player_id, edits } =
            parse(&["update-player", "p1", "--goals", "4", "--assists", "2", "--played", "3"])
        else {
            panic!("expected update-player");
        };
        assert_eq!(player_id, "p1");
        let patch = edits.into_patch();
        assert_eq!(
            (patch.goals, patch.assists, patch.matches_played),
            (Some(4), Some(2), Some(3))
        );
        assert_eq!(patch.name, None);
        assert_eq!(patch.jersey_number, None);
    }

    #[test]
    fn negative_stats_are_rejected_by_the_parser() {
        let parsed = Args::try_parse_from(["touchline", "update-player", "p1", "--goals", "-1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn edit_team_maps_captain_flags() {
        let Command::EditTeam { team_id, edits } =
            parse(&["edit-team", "t1", "--captain", "Rae", "--captain-email", "rae@example.com"])
        else {
            panic!("expected edit-team");
        };
        assert_eq!(team_id, "t1");
        let patch = edits.into_patch();
        assert_eq!(patch.captain_name.as_deref(), Some("Rae"));
        assert_eq!(patch.captain_email.as_deref(), Some("rae@example.com"));
        assert_eq!(patch.name, None);
    }

    #[test]
    fn edit_league_sets_name_and_dates() {
        let Command::EditLeague { edits, .. } =
            parse(&["edit-league", "l1", "--name", "Winter Cup", "--start", "2025-01-04"])
        else {
            panic!("expected edit-league");
        };
        let patch = edits.into_patch();
        assert_eq!(patch.name.as_deref(), Some("Winter Cup"));
        assert_eq!(patch.start_date, NaiveDate::from_ymd_opt(2025, 1, 4));
        assert_eq!(patch.end_date, None);
    }

    #[test]
    fn removal_commands_take_an_id() {
        assert!(matches!(
            parse(&["remove-team", "t1"]),
            Command::RemoveTeam { team_id } if team_id == "t1"
        ));
        assert!(matches!(
            parse(&["remove-player", "p1"]),
            Command::RemovePlayer { player_id } if player_id == "p1"
        ));
        assert!(matches!(
            parse(&["delete-league", "l1"]),
            Command::DeleteLeague { league_id } if league_id == "l1"
        ));
    }
}
