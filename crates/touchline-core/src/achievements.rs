// Achievement leaderboard: top scorer, most assists, most active player.

use std::cmp::Reverse;

use serde::Serialize;

/// A player's cumulative counters, joined with their team's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLine {
    pub player_id: String,
    pub player_name: String,
    pub team_name: String,
    pub goals: u32,
    pub assists: u32,
    pub matches_played: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    TopScorer,
    MostAssists,
    MostActive,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::TopScorer,
        Category::MostAssists,
        Category::MostActive,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Category::TopScorer => "Top Scorer",
            Category::MostAssists => "Most Assists",
            Category::MostActive => "Most Active Player",
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            Category::TopScorer => "Goals",
            Category::MostAssists => "Assists",
            Category::MostActive => "Matches",
        }
    }

    fn value(&self, line: &PlayerLine) -> u32 {
        match self {
            Category::TopScorer => line.goals,
            Category::MostAssists => line.assists,
            Category::MostActive => line.matches_played,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Award {
    pub category: Category,
    pub player_id: String,
    pub player_name: String,
    pub team_name: String,
    pub value: u32,
}

impl Award {
    /// e.g. "12 Goals".
    pub fn value_label(&self) -> String {
        format!("{} {}", self.value, self.category.unit())
    }
}

/// The leader of one category. Ties on the value go to the player whose name
/// sorts first, then to the lower player id. A category whose best value is
/// zero has no leader.
pub fn leader(players: &[PlayerLine], category: Category) -> Option<Award> {
    let best = players.iter().min_by(|a, b| {
        let key = |p: &PlayerLine| Reverse(category.value(p));
        key(a)
            .cmp(&key(b))
            .then_with(|| a.player_name.cmp(&b.player_name))
            .then_with(|| a.player_id.cmp(&b.player_id))
    })?;

    let value = category.value(best);
    if value == 0 {
        return None;
    }
    Some(Award {
        category,
        player_id: best.player_id.clone(),
        player_name: best.player_name.clone(),
        team_name: best.team_name.clone(),
        value,
    })
}

/// All awards that have a leader, in category order.
pub fn achievements(players: &[PlayerLine]) -> Vec<Award> {
    Category::ALL
        .iter()
        .filter_map(|&category| leader(players, category))
        .collect()
}
