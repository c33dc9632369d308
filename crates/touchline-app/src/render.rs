// Plain-text rendering of console read models, plus CSV export of standings.

use touchline_core::access::AccessGrant;
use touchline_core::achievements::Award;
use touchline_core::format::{format_date, format_day, format_time, status_label};
use touchline_core::model::{League, Match, Player, Team};
use touchline_core::standings::StandingsRow;

use crate::app::DashboardSummary;
use crate::config::DisplayConfig;

/// Left-aligned columns separated by two spaces, with a rule under the
/// header.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers.to_vec()));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(rule.iter().map(String::as_str).collect()));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

fn team_name<'a>(teams: &'a [Team], id: &str) -> &'a str {
    teams
        .iter()
        .find(|t| t.id == id)
        .map(|t| t.name.as_str())
        .unwrap_or("?")
}

fn opt(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

pub fn leagues(leagues: &[League], display: &DisplayConfig) -> String {
    if leagues.is_empty() {
        return "No leagues yet.\n".to_string();
    }
    let rows: Vec<Vec<String>> = leagues
        .iter()
        .map(|l| {
            vec![
                l.id.clone(),
                l.name.clone(),
                status_label(l.status.as_deref().unwrap_or("")),
                format_day(l.start_date.as_ref(), &display.date_format),
                format_day(l.end_date.as_ref(), &display.date_format),
            ]
        })
        .collect();
    table(&["ID", "NAME", "STATUS", "STARTS", "ENDS"], &rows)
}

pub fn grant(grant: Option<&AccessGrant>) -> String {
    match grant {
        None => "No league selected.\n".to_string(),
        Some(g) => {
            let who = if g.user_email.is_empty() {
                "anonymous"
            } else {
                g.user_email.as_str()
            };
            format!(
                "{} ({})\n{} as {} ({})\n",
                g.name,
                g.id,
                who,
                if g.is_admin() { "admin" } else { "viewer" },
                g.reason()
            )
        }
    }
}

pub fn standings(rows: &[StandingsRow]) -> String {
    let body: Vec<Vec<String>> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            vec![
                (i + 1).to_string(),
                r.team_name.clone(),
                r.matches_played.to_string(),
                r.wins.to_string(),
                r.draws.to_string(),
                r.losses.to_string(),
                r.goals_for.to_string(),
                r.goals_against.to_string(),
                format!("{:+}", r.goal_difference),
                r.points.to_string(),
            ]
        })
        .collect();
    table(
        &["#", "TEAM", "P", "W", "D", "L", "GF", "GA", "GD", "PTS"],
        &body,
    )
}

/// Standings as CSV with a header row.
pub fn standings_csv(rows: &[StandingsRow]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "position",
        "team",
        "played",
        "won",
        "drawn",
        "lost",
        "goals_for",
        "goals_against",
        "goal_difference",
        "points",
    ])?;
    for (i, r) in rows.iter().enumerate() {
        writer.write_record([
            (i + 1).to_string(),
            r.team_name.clone(),
            r.matches_played.to_string(),
            r.wins.to_string(),
            r.draws.to_string(),
            r.losses.to_string(),
            r.goals_for.to_string(),
            r.goals_against.to_string(),
            r.goal_difference.to_string(),
            r.points.to_string(),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn awards(awards: &[Award]) -> String {
    if awards.is_empty() {
        return "No achievements yet.\n".to_string();
    }
    let rows: Vec<Vec<String>> = awards
        .iter()
        .map(|a| {
            vec![
                a.category.title().to_string(),
                a.player_name.clone(),
                a.team_name.clone(),
                a.value_label(),
            ]
        })
        .collect();
    table(&["AWARD", "PLAYER", "TEAM", ""], &rows)
}

pub fn matches(matches: &[Match], teams: &[Team], display: &DisplayConfig) -> String {
    if matches.is_empty() {
        return "No matches scheduled.\n".to_string();
    }
    let rows: Vec<Vec<String>> = matches
        .iter()
        .map(|m| {
            let score = match (m.team1_score, m.team2_score) {
                (Some(a), Some(b)) => format!("{a}-{b}"),
                _ => "vs".to_string(),
            };
            vec![
                m.id.clone(),
                format_date(m.match_date.as_ref(), &display.date_format),
                format_time(m.match_date.as_ref(), &display.time_format),
                team_name(teams, &m.team1_id).to_string(),
                score,
                team_name(teams, &m.team2_id).to_string(),
                opt(m.venue.as_deref()),
                status_label(m.status.as_str()),
            ]
        })
        .collect();
    table(
        &["ID", "DATE", "TIME", "HOME", "", "AWAY", "VENUE", "STATUS"],
        &rows,
    )
}

pub fn teams(teams: &[Team]) -> String {
    if teams.is_empty() {
        return "No teams yet.\n".to_string();
    }
    let rows: Vec<Vec<String>> = teams
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                t.name.clone(),
                opt(t.captain_name.as_deref()),
                opt(t.captain_email.as_deref()),
            ]
        })
        .collect();
    table(&["ID", "NAME", "CAPTAIN", "EMAIL"], &rows)
}

pub fn players(players: &[Player], teams: &[Team]) -> String {
    if players.is_empty() {
        return "No players yet.\n".to_string();
    }
    let rows: Vec<Vec<String>> = players
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.jersey_number.map_or("-".to_string(), |n| n.to_string()),
                p.name.clone(),
                team_name(teams, &p.team_id).to_string(),
                opt(p.position.as_deref()),
                p.goals.to_string(),
                p.assists.to_string(),
                p.matches_played.to_string(),
            ]
        })
        .collect();
    table(
        &["ID", "NO", "NAME", "TEAM", "POS", "G", "A", "MP"],
        &rows,
    )
}

pub fn summary(summary: &DashboardSummary) -> String {
    let mut out = format!(
        "{}\n  Teams: {}\n  Players: {}\n  Matches: {} scheduled, {} ongoing, {} completed\n",
        summary.league_name,
        summary.teams,
        summary.players,
        summary.scheduled,
        summary.ongoing,
        summary.completed
    );
    if let Some(leader) = &summary.leader {
        out.push_str(&format!(
            "  Leader: {} ({} pts)\n",
            leader.team_name, leader.points
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, points: u32, gd: i64) -> StandingsRow {
        StandingsRow {
            points,
            goal_difference: gd,
            ..StandingsRow::new(name.to_lowercase(), name)
        }
    }

    #[test]
    fn standings_table_has_positions_and_signed_goal_difference() {
        let text = standings(&[row("Alpha", 6, 3), row("Beta", 0, -3)]);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("#  TEAM"));
        assert!(lines[2].starts_with("1  Alpha"));
        assert!(lines[2].contains("+3"));
        assert!(lines[3].starts_with("2  Beta"));
        assert!(lines[3].contains("-3"));
    }

    #[test]
    fn csv_export_quotes_names_with_commas() {
        let csv = standings_csv(&[row("Rovers, FC", 3, 1)]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("position,team,played,won,drawn,lost,goals_for,goals_against,goal_difference,points")
        );
        assert_eq!(lines.next(), Some("1,\"Rovers, FC\",0,0,0,0,0,0,1,3"));
    }

    #[test]
    fn empty_collections_render_placeholders() {
        let display = DisplayConfig::default();
        assert_eq!(leagues(&[], &display), "No leagues yet.\n");
        assert_eq!(matches(&[], &[], &display), "No matches scheduled.\n");
        assert_eq!(awards(&[]), "No achievements yet.\n");
        assert_eq!(grant(None), "No league selected.\n");
    }
}
