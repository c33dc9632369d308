// Standings engine: aggregates completed match results into a ranked table.
//
// Pure and deterministic. Ranking is points descending, then goal
// difference descending, then team name ascending, then team id, so two
// runs over the same inputs always produce the same order.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Match, Team};

pub const POINTS_PER_WIN: u32 = 3;
pub const POINTS_PER_DRAW: u32 = 1;

/// One team's line in the league table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsRow {
    pub team_id: String,
    pub team_name: String,
    pub matches_played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i64,
    pub points: u32,
}

impl StandingsRow {
    /// A row with every counter at zero.
    pub fn new(team_id: impl Into<String>, team_name: impl Into<String>) -> Self {
        StandingsRow {
            team_id: team_id.into(),
            team_name: team_name.into(),
            matches_played: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            goals_for: 0,
            goals_against: 0,
            goal_difference: 0,
            points: 0,
        }
    }

    /// Record one result from this team's perspective.
    fn record(&mut self, scored: u32, conceded: u32) {
        self.matches_played += 1;
        self.goals_for = self.goals_for.saturating_add(scored);
        self.goals_against = self.goals_against.saturating_add(conceded);
        match scored.cmp(&conceded) {
            Ordering::Greater => self.wins += 1,
            Ordering::Less => self.losses += 1,
            Ordering::Equal => self.draws += 1,
        }
        self.recompute();
    }

    /// Re-derive goal difference and points from the raw counters.
    pub fn recompute(&mut self) {
        self.goal_difference = i64::from(self.goals_for) - i64::from(self.goals_against);
        self.points = POINTS_PER_WIN * self.wins + POINTS_PER_DRAW * self.draws;
    }
}

/// Total table order: points desc, goal difference desc, name asc, id asc.
pub fn table_order(a: &StandingsRow, b: &StandingsRow) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.goal_difference.cmp(&a.goal_difference))
        .then_with(|| a.team_name.cmp(&b.team_name))
        .then_with(|| a.team_id.cmp(&b.team_id))
}

/// Build the league table for `teams` from `matches`.
///
/// Every match must reference teams from `teams`, whether or not it has a
/// result yet; a stray reference fails the whole computation with
/// [`Error::InvalidMatchReference`], as does a team drawn against itself.
/// Only completed matches with both scores
/// contribute. Teams without a counted match still get a zero row.
pub fn compute_standings(teams: &[Team], matches: &[Match]) -> Result<Vec<StandingsRow>> {
    let mut rows: Vec<StandingsRow> = Vec::with_capacity(teams.len());
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(teams.len());
    for team in teams {
        if index.contains_key(team.id.as_str()) {
            continue;
        }
        index.insert(team.id.as_str(), rows.len());
        rows.push(StandingsRow::new(&team.id, &team.name));
    }

    let lookup = |m: &Match, team_id: &str| -> Result<usize> {
        index
            .get(team_id)
            .copied()
            .ok_or_else(|| Error::InvalidMatchReference {
                match_id: m.id.clone(),
                team_id: team_id.to_string(),
            })
    };

    for m in matches {
        let home = lookup(m, &m.team1_id)?;
        let away = lookup(m, &m.team2_id)?;
        if home == away {
            return Err(Error::InvalidMatchReference {
                match_id: m.id.clone(),
                team_id: m.team2_id.clone(),
            });
        }
        let Some((s1, s2)) = m.result() else {
            continue;
        };
        rows[home].record(s1, s2);
        rows[away].record(s2, s1);
    }

    rows.sort_by(table_order);
    Ok(rows)
}

/// Rank an already-aggregated counter set (for instance rows read back from
/// the persisted points table). Derived columns are recomputed first so a
/// stale cached value can't affect the order.
pub fn rank(mut rows: Vec<StandingsRow>) -> Vec<StandingsRow> {
    for row in &mut rows {
        row.recompute();
    }
    rows.sort_by(table_order);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchStatus;

    fn team(id: &str) -> Team {
        Team {
            id: id.to_string(),
            name: id.to_string(),
            logo_url: None,
            captain_name: None,
            captain_email: None,
            league_id: "league-1".to_string(),
        }
    }

    fn played(id: &str, t1: &str, s1: u32, t2: &str, s2: u32) -> Match {
        Match {
            id: id.to_string(),
            league_id: "league-1".to_string(),
            team1_id: t1.to_string(),
            team2_id: t2.to_string(),
            team1_score: Some(s1),
            team2_score: Some(s2),
            status: MatchStatus::Completed,
            venue: None,
            match_date: None,
        }
    }

    fn scheduled(id: &str, t1: &str, t2: &str) -> Match {
        Match {
            team1_score: None,
            team2_score: None,
            status: MatchStatus::Scheduled,
            ..played(id, t1, 0, t2, 0)
        }
    }

    /// (played, wins, draws, losses, gf, ga, gd, points)
    fn counters(row: &StandingsRow) -> (u32, u32, u32, u32, u32, u32, i64, u32) {
        (
            row.matches_played,
            row.wins,
            row.draws,
            row.losses,
            row.goals_for,
            row.goals_against,
            row.goal_difference,
            row.points,
        )
    }

    fn names(rows: &[StandingsRow]) -> Vec<&str> {
        rows.iter().map(|r| r.team_name.as_str()).collect()
    }

    // ------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------

    #[test]
    fn four_team_example() {
        let teams = [team("A"), team("B"), team("C"), team("D")];
        let matches = [
            played("m1", "A", 2, "B", 1),
            played("m2", "C", 0, "D", 0),
            scheduled("m3", "A", "C"),
        ];

        let table = compute_standings(&teams, &matches).unwrap();

        assert_eq!(names(&table), ["A", "C", "D", "B"]);
        assert_eq!(counters(&table[0]), (1, 1, 0, 0, 2, 1, 1, 3));
        assert_eq!(counters(&table[1]), (1, 0, 1, 0, 0, 0, 0, 1));
        assert_eq!(counters(&table[2]), (1, 0, 1, 0, 0, 0, 0, 1));
        assert_eq!(counters(&table[3]), (1, 0, 0, 1, 1, 2, -1, 0));
    }

    #[test]
    fn teams_without_results_get_zero_rows() {
        let teams = [team("A"), team("B")];
        let table = compute_standings(&teams, &[]).unwrap();
        assert_eq!(table.len(), 2);
        for row in &table {
            assert_eq!(counters(row), (0, 0, 0, 0, 0, 0, 0, 0));
        }
    }

    #[test]
    fn ongoing_and_scoreless_matches_are_skipped() {
        let teams = [team("A"), team("B")];
        let mut ongoing = played("m1", "A", 3, "B", 0);
        ongoing.status = MatchStatus::Ongoing;
        let mut missing_score = played("m2", "A", 1, "B", 0);
        missing_score.team2_score = None;

        let table = compute_standings(&teams, &[ongoing, missing_score]).unwrap();
        assert!(table.iter().all(|r| r.matches_played == 0));
    }

    #[test]
    fn away_win_is_symmetric() {
        let teams = [team("A"), team("B")];
        let table = compute_standings(&teams, &[played("m1", "A", 0, "B", 4)]).unwrap();
        assert_eq!(table[0].team_id, "B");
        assert_eq!(counters(&table[0]), (1, 1, 0, 0, 4, 0, 4, 3));
        assert_eq!(counters(&table[1]), (1, 0, 0, 1, 0, 4, -4, 0));
    }

    #[test]
    fn duplicate_team_entries_produce_one_row() {
        let teams = [team("A"), team("A"), team("B")];
        let table = compute_standings(&teams, &[played("m1", "A", 1, "B", 0)]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].matches_played, 1);
    }

    // ------------------------------------------------------------------
    // Invalid references
    // ------------------------------------------------------------------

    #[test]
    fn match_outside_team_set_is_rejected() {
        let teams = [team("A"), team("B")];
        let err = compute_standings(&teams, &[played("m9", "A", 1, "Z", 0)]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidMatchReference {
                match_id: "m9".into(),
                team_id: "Z".into(),
            }
        );
    }

    #[test]
    fn scheduled_match_outside_team_set_is_also_rejected() {
        let teams = [team("A")];
        let err = compute_standings(&teams, &[scheduled("m1", "X", "A")]).unwrap_err();
        assert!(matches!(err, Error::InvalidMatchReference { team_id, .. } if team_id == "X"));
    }

    #[test]
    fn team_playing_itself_is_rejected() {
        let teams = [team("A"), team("B")];
        let err = compute_standings(&teams, &[played("m5", "A", 2, "A", 1)]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidMatchReference {
                match_id: "m5".into(),
                team_id: "A".into(),
            }
        );
    }

    #[test]
    fn huge_scores_saturate_instead_of_overflowing() {
        let teams = [team("A"), team("B")];
        let matches = [
            played("m1", "A", u32::MAX, "B", 0),
            played("m2", "A", 5, "B", 0),
        ];
        let table = compute_standings(&teams, &matches).unwrap();
        assert_eq!(table[0].team_id, "A");
        assert_eq!(table[0].goals_for, u32::MAX);
        assert_eq!(table[1].goals_against, u32::MAX);
        assert_eq!(table[0].wins, 2);
    }

    // ------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------

    #[test]
    fn goal_difference_breaks_points_ties() {
        let teams = [team("A"), team("B"), team("C"), team("D")];
        let matches = [played("m1", "A", 1, "C", 0), played("m2", "B", 5, "D", 0)];
        let table = compute_standings(&teams, &matches).unwrap();
        assert_eq!(names(&table), ["B", "A", "C", "D"]);
    }

    #[test]
    fn full_ties_fall_back_to_name_ascending() {
        let teams = [team("Zebras"), team("Ants"), team("Moles")];
        let table = compute_standings(&teams, &[]).unwrap();
        assert_eq!(names(&table), ["Ants", "Moles", "Zebras"]);
    }

    #[test]
    fn shared_names_fall_back_to_team_id() {
        let united = |id: &str| Team {
            name: "United".to_string(),
            ..team(id)
        };
        let forward = compute_standings(&[united("x1"), united("x2")], &[]).unwrap();
        let backward = compute_standings(&[united("x2"), united("x1")], &[]).unwrap();
        let ids = |rows: &[StandingsRow]| -> Vec<String> {
            rows.iter().map(|r| r.team_id.clone()).collect()
        };
        assert_eq!(ids(&forward), ["x1", "x2"]);
        assert_eq!(ids(&backward), ["x1", "x2"]);
    }

    #[test]
    fn rank_recomputes_stale_derived_columns() {
        let mut cached = StandingsRow::new("a", "A");
        cached.wins = 2;
        cached.goals_for = 4;
        cached.goals_against = 1;
        cached.points = 0; // stale
        let other = StandingsRow {
            draws: 1,
            points: 1,
            ..StandingsRow::new("b", "B")
        };

        let ranked = rank(vec![other, cached]);
        assert_eq!(ranked[0].team_id, "a");
        assert_eq!(ranked[0].points, 6);
        assert_eq!(ranked[0].goal_difference, 3);
    }

    // ------------------------------------------------------------------
    // Table-wide properties
    // ------------------------------------------------------------------

    #[test]
    fn totals_balance_across_a_round_robin() {
        let ids = ["A", "B", "C", "D", "E"];
        let teams: Vec<Team> = ids.iter().map(|id| team(id)).collect();
        let mut matches = Vec::new();
        let mut drawn = 0;
        for (i, t1) in ids.iter().enumerate() {
            for (j, t2) in ids.iter().enumerate().skip(i + 1) {
                let s1 = ((i * 7 + j * 3) % 4) as u32;
                let s2 = ((i * 2 + j * 5) % 3) as u32;
                if s1 == s2 {
                    drawn += 1;
                }
                matches.push(played(&format!("m{i}{j}"), t1, s1, t2, s2));
            }
        }

        let table = compute_standings(&teams, &matches).unwrap();

        let wins: u32 = table.iter().map(|r| r.wins).sum();
        let losses: u32 = table.iter().map(|r| r.losses).sum();
        let draws: u32 = table.iter().map(|r| r.draws).sum();
        let gf: u32 = table.iter().map(|r| r.goals_for).sum();
        let ga: u32 = table.iter().map(|r| r.goals_against).sum();
        assert_eq!(wins, losses);
        assert_eq!(draws, 2 * drawn);
        assert_eq!(gf, ga);

        for row in &table {
            assert_eq!(row.points, 3 * row.wins + row.draws);
            assert_eq!(
                row.goal_difference,
                i64::from(row.goals_for) - i64::from(row.goals_against)
            );
            assert_eq!(row.matches_played, row.wins + row.draws + row.losses);
        }

        for pair in table.windows(2) {
            assert_ne!(table_order(&pair[0], &pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn input_order_does_not_change_output() {
        let teams = [team("A"), team("B"), team("C")];
        let matches = [played("m1", "A", 1, "B", 1), played("m2", "B", 2, "C", 0)];
        let forward = compute_standings(&teams, &matches).unwrap();

        let reversed_teams = [team("C"), team("B"), team("A")];
        let reversed_matches = [matches[1].clone(), matches[0].clone()];
        let backward = compute_standings(&reversed_teams, &reversed_matches).unwrap();

        assert_eq!(forward, backward);
    }
}
