// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use portal_core::{Column, EntityId, FieldReader, Fields, Record, Timestamp, UserId};
use serde::Serialize;

use crate::error::UnknownStatus;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

impl FromStr for InvitationStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "declined" => Ok(InvitationStatus::Declined),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invitation of one user by another to play a game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Invitation {
    pub from: UserId,
    pub from_name: String,
    pub to: UserId,
    pub status: InvitationStatus,

    /// Game created when the invitation was accepted.
    pub game_id: Option<EntityId>,

    pub responded_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Invitation {
    pub fn involves(&self, user: &UserId) -> bool {
        &self.from == user || &self.to == user
    }

    /// Returns `true` if the invitation is between the two users, in any direction.
    pub fn same_pair(&self, a: &UserId, b: &UserId) -> bool {
        (&self.from == a && &self.to == b) || (&self.from == b && &self.to == a)
    }
}

impl Record for Invitation {
    const TABLE: &'static str = "invitations";

    const COLUMNS: &'static [Column] = &[
        Column::lww("from_id"),
        Column::lww("from_name"),
        Column::lww("to_id"),
        Column::lww("status"),
        Column::lww("game_id"),
        Column::lww("responded_at"),
        Column::fww("created_at"),
    ];

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("from_id", &self.from)
            .with_text("from_name", &self.from_name)
            .with("to_id", &self.to)
            .with_text("status", self.status.as_str())
            .with_optional_text("game_id", self.game_id.map(|id| id.to_hex()).as_deref())
            .with_optional_timestamp("responded_at", self.responded_at)
            .with_timestamp("created_at", self.created_at)
    }

    fn from_fields(fields: &FieldReader<'_>) -> Self {
        Self {
            from: fields.user("from_id"),
            from_name: fields.text("from_name"),
            to: fields.user("to_id"),
            status: fields.parse("status"),
            game_id: fields.entity_id("game_id"),
            responded_at: fields.optional_timestamp("responded_at"),
            created_at: fields.timestamp("created_at"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(&self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Status of a game this side has won.
    pub fn victory(&self) -> GameStatus {
        match self {
            Side::White => GameStatus::WhiteWon,
            Side::Black => GameStatus::BlackWon,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "white"),
            Side::Black => write!(f, "black"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Active,
    WhiteWon,
    BlackWon,
    Draw,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::WhiteWon => "white_won",
            GameStatus::BlackWon => "black_won",
            GameStatus::Draw => "draw",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::Active)
    }

    pub fn winner(&self) -> Option<Side> {
        match self {
            GameStatus::WhiteWon => Some(Side::White),
            GameStatus::BlackWon => Some(Side::Black),
            _ => None,
        }
    }
}

impl FromStr for GameStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(GameStatus::Active),
            "white_won" => Ok(GameStatus::WhiteWon),
            "black_won" => Ok(GameStatus::BlackWon),
            "draw" => Ok(GameStatus::Draw),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Two-player game with a clock per side.
///
/// There is no turn column, the side to move follows from the number of moves played. Player
/// names are denormalised onto every row for listing games without further lookups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Game {
    pub white: UserId,
    pub white_name: String,
    pub black: UserId,
    pub black_name: String,
    pub moves: Vec<String>,
    pub status: GameStatus,
    pub reason: Option<String>,
    pub white_clock: Duration,
    pub black_clock: Duration,

    /// Time of the last move, or of the creation of the game if no move was made yet.
    pub last_move_at: Timestamp,

    pub invitation_id: Option<EntityId>,
    pub created_at: Timestamp,
}

impl Game {
    /// White moves on even move counts, Black on odd ones.
    pub fn side_to_move(&self) -> Side {
        if self.moves.len() % 2 == 0 {
            Side::White
        } else {
            Side::Black
        }
    }

    pub fn side_of(&self, user: &UserId) -> Option<Side> {
        if &self.white == user {
            Some(Side::White)
        } else if &self.black == user {
            Some(Side::Black)
        } else {
            None
        }
    }

    pub fn player(&self, side: Side) -> (&UserId, &str) {
        match side {
            Side::White => (&self.white, &self.white_name),
            Side::Black => (&self.black, &self.black_name),
        }
    }

    pub fn clock(&self, side: Side) -> Duration {
        match side {
            Side::White => self.white_clock,
            Side::Black => self.black_clock,
        }
    }

    pub fn clock_mut(&mut self, side: Side) -> &mut Duration {
        match side {
            Side::White => &mut self.white_clock,
            Side::Black => &mut self.black_clock,
        }
    }
}

fn duration_from_millis(millis: i64) -> Duration {
    Duration::from_millis(millis.max(0) as u64)
}

impl Record for Game {
    const TABLE: &'static str = "games";

    const COLUMNS: &'static [Column] = &[
        Column::lww("white_id"),
        Column::lww("white_name"),
        Column::lww("black_id"),
        Column::lww("black_name"),
        Column::lww("moves"),
        Column::lww("status"),
        Column::lww("reason"),
        Column::lww("white_clock_ms"),
        Column::lww("black_clock_ms"),
        Column::lww("last_move_at"),
        Column::lww("invitation_id"),
        Column::fww("created_at"),
    ];

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("white_id", &self.white)
            .with_text("white_name", &self.white_name)
            .with("black_id", &self.black)
            .with_text("black_name", &self.black_name)
            .with_json("moves", &self.moves)
            .with_text("status", self.status.as_str())
            .with_optional_text("reason", self.reason.as_deref())
            .with_integer("white_clock_ms", self.white_clock.as_millis() as i64)
            .with_integer("black_clock_ms", self.black_clock.as_millis() as i64)
            .with_timestamp("last_move_at", self.last_move_at)
            .with_optional_text(
                "invitation_id",
                self.invitation_id.map(|id| id.to_hex()).as_deref(),
            )
            .with_timestamp("created_at", self.created_at)
    }

    fn from_fields(fields: &FieldReader<'_>) -> Self {
        Self {
            white: fields.user("white_id"),
            white_name: fields.text("white_name"),
            black: fields.user("black_id"),
            black_name: fields.text("black_name"),
            moves: fields.json("moves"),
            status: fields.parse("status"),
            reason: fields.optional_text("reason"),
            white_clock: duration_from_millis(fields.integer("white_clock_ms")),
            black_clock: duration_from_millis(fields.integer("black_clock_ms")),
            last_move_at: fields.timestamp("last_move_at"),
            invitation_id: fields.entity_id("invitation_id"),
            created_at: fields.timestamp("created_at"),
        }
    }
}
