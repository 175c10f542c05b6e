// SPDX-License-Identifier: MIT OR Apache-2.0

//! Invitations and two-player games with per-side clocks.
//!
//! An invitation moves from `pending` to either `accepted` or `declined`. Accepting it starts a
//! game which stays `active` until one side wins, the game is drawn or a clock runs out.
//!
//! Game rules are not enforced here. Moves are stored as opaque text in the order they were
//! played and finished games carry the result reported by their players.
mod engine;
mod record;
mod stats;

pub use engine::{GameEngine, GameRevision};
pub use record::{Game, GameStatus, Invitation, InvitationStatus, Side};
pub use stats::{GameResult, LeaderboardEntry, Outcome, Tally, leaderboard, results_of, tally_of};
