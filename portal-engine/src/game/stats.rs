// SPDX-License-Identifier: MIT OR Apache-2.0

//! Results and rankings folded over finished games.
use std::collections::HashMap;

use portal_core::{EntityId, Snapshot, Timestamp, UserId};
use serde::Serialize;

use crate::game::record::{Game, GameStatus, Side};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    fn of(status: GameStatus, side: Side) -> Option<Outcome> {
        match status {
            GameStatus::Active => None,
            GameStatus::Draw => Some(Outcome::Draw),
            status if status.winner() == Some(side) => Some(Outcome::Win),
            _ => Some(Outcome::Loss),
        }
    }
}

/// One finished game from the perspective of one of its players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameResult {
    pub game_id: EntityId,
    pub side: Side,
    pub opponent: UserId,
    pub opponent_name: String,
    pub outcome: Outcome,
    pub reason: Option<String>,
    pub moves: usize,
    pub started_at: Timestamp,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl Tally {
    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
        }
    }

    pub fn played(&self) -> u32 {
        self.wins + self.losses + self.draws
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub user: UserId,
    pub name: String,
    pub tally: Tally,
}

/// Finished games of a user, most recently started first.
pub fn results_of(user: &UserId, games: &[Snapshot<Game>]) -> Vec<GameResult> {
    let mut results: Vec<GameResult> = games
        .iter()
        .filter_map(|snapshot| {
            let game = &snapshot.record;
            let side = game.side_of(user)?;
            let outcome = Outcome::of(game.status, side)?;
            let (opponent, opponent_name) = game.player(side.opponent());
            Some(GameResult {
                game_id: snapshot.entity_id,
                side,
                opponent: opponent.clone(),
                opponent_name: opponent_name.to_string(),
                outcome,
                reason: game.reason.clone(),
                moves: game.moves.len(),
                started_at: game.created_at,
            })
        })
        .collect();
    results.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    results
}

pub fn tally_of(user: &UserId, games: &[Snapshot<Game>]) -> Tally {
    let mut tally = Tally::default();
    for result in results_of(user, games) {
        tally.count(result.outcome);
    }
    tally
}

/// Rank all players of finished games.
///
/// Every finished game counts once for each side. Players are ordered by wins (descending),
/// losses (ascending) and finally by name. The latest name seen for a player is used.
pub fn leaderboard(games: &[Snapshot<Game>]) -> Vec<LeaderboardEntry> {
    let mut entries: HashMap<UserId, LeaderboardEntry> = HashMap::new();

    for snapshot in games {
        let game = &snapshot.record;
        for side in [Side::White, Side::Black] {
            let Some(outcome) = Outcome::of(game.status, side) else {
                continue;
            };
            let (user, name) = game.player(side);
            let entry = entries
                .entry(user.clone())
                .or_insert_with(|| LeaderboardEntry {
                    user: user.clone(),
                    name: name.to_string(),
                    tally: Tally::default(),
                });
            entry.name = name.to_string();
            entry.tally.count(outcome);
        }
    }

    let mut entries: Vec<LeaderboardEntry> = entries.into_values().collect();
    entries.sort_by(|a, b| {
        b.tally
            .wins
            .cmp(&a.tally.wins)
            .then_with(|| a.tally.losses.cmp(&b.tally.losses))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.user.cmp(&b.user))
    });
    entries
}
