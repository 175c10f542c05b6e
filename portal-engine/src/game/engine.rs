// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use portal_core::{Clock, EntityId, Snapshot, UserId, Version};
use portal_store::{Filter, Ledger, RecordStore};
use tracing::debug;

use crate::caller::Caller;
use crate::config::GameConfig;
use crate::error::PortalError;
use crate::game::record::{Game, GameStatus, Invitation, InvitationStatus};
use crate::game::stats::{GameResult, LeaderboardEntry, Tally, leaderboard, results_of, tally_of};

/// One stored revision of a game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameRevision {
    pub version: Version,
    pub game: Game,
}

/// Invitations and two-player games.
///
/// The engine owns turn exclusivity, the clocks of both sides and termination. It does not know
/// the rules of the game: moves are opaque text and outcomes other than timeouts are reported by
/// the players themselves (see [`GameEngine::finish_game`]).
#[derive(Debug)]
pub struct GameEngine<S> {
    invitations: Ledger<S, Invitation>,
    games: Ledger<S, Game>,
    clock: Arc<dyn Clock>,
    config: GameConfig,
}

impl<S> GameEngine<S>
where
    S: RecordStore + Clone,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, config: GameConfig) -> Self {
        Self {
            invitations: Ledger::new(store.clone(), clock.clone()),
            games: Ledger::new(store, clock.clone()),
            clock,
            config,
        }
    }

    /// Invite another user to a game.
    ///
    /// Only one pending invitation may exist between two users, no matter who invited whom. This
    /// is checked by scanning existing invitations: two users inviting each other at the same
    /// time can still both succeed.
    pub async fn send_invite(
        &self,
        caller: &Caller,
        to: &UserId,
    ) -> Result<Snapshot<Invitation>, PortalError<S::Error>> {
        if caller.is(to) {
            return Err(PortalError::InvalidInput(
                "users can not invite themselves".into(),
            ));
        }

        let pair = Filter::Or(vec![
            Filter::And(vec![
                Filter::equals("from_id", &caller.id),
                Filter::equals("to_id", to),
            ]),
            Filter::And(vec![
                Filter::equals("from_id", to),
                Filter::equals("to_id", &caller.id),
            ]),
        ]);
        let open = self
            .invitations
            .load_where(&pair)
            .await?
            .into_iter()
            .any(|snapshot| {
                snapshot.record.status == InvitationStatus::Pending
                    && snapshot.record.same_pair(&caller.id, to)
            });
        if open {
            return Err(PortalError::Conflict(format!(
                "a pending invitation between {} and {} exists already",
                caller.id, to
            )));
        }

        let now = self.clock.now();
        let snapshot = self
            .invitations
            .create(&Invitation {
                from: caller.id.clone(),
                from_name: caller.name.clone(),
                to: to.clone(),
                status: InvitationStatus::Pending,
                game_id: None,
                responded_at: None,
                created_at: now,
            })
            .await?;

        debug!(invitation = %snapshot.entity_id, from = %caller.id, %to, "sent invitation");
        Ok(snapshot)
    }

    /// Accept an invitation and start a game with randomly assigned colors.
    ///
    /// The invitation is marked as accepted first, a second accept of the same invitation fails
    /// before any game was created. The game is created afterwards under the id recorded in the
    /// invitation; both appends are not atomic.
    pub async fn accept_invite(
        &self,
        caller: &Caller,
        id: &EntityId,
    ) -> Result<Snapshot<Game>, PortalError<S::Error>> {
        let prior = self.load_invitation(id).await?;
        let invitation = &prior.record;

        if !caller.is(&invitation.to) {
            return Err(PortalError::Forbidden(
                "only the invited user can accept an invitation".into(),
            ));
        }

        if invitation.status.is_terminal() {
            return Err(PortalError::Conflict(format!(
                "invitation {} is already {}",
                id, invitation.status
            )));
        }

        let now = self.clock.now();
        let game_id = EntityId::random();
        let accepted = Invitation {
            status: InvitationStatus::Accepted,
            game_id: Some(game_id),
            responded_at: Some(now),
            ..invitation.clone()
        };
        self.invitations.commit(&prior, &accepted).await?;

        let (inviter, invitee) = (
            (invitation.from.clone(), invitation.from_name.clone()),
            (caller.id.clone(), caller.name.clone()),
        );
        let ((white, white_name), (black, black_name)) = if rand::random::<bool>() {
            (inviter, invitee)
        } else {
            (invitee, inviter)
        };

        let game = self
            .games
            .create_with_id(
                game_id,
                &Game {
                    white,
                    white_name,
                    black,
                    black_name,
                    moves: Vec::new(),
                    status: GameStatus::Active,
                    reason: None,
                    white_clock: self.config.initial_clock,
                    black_clock: self.config.initial_clock,
                    last_move_at: now,
                    invitation_id: Some(*id),
                    created_at: now,
                },
            )
            .await?;

        debug!(
            invitation = %id,
            game = %game_id,
            white = %game.record.white,
            black = %game.record.black,
            "accepted invitation and started game"
        );
        Ok(game)
    }

    /// Decline an invitation. Both the inviting and the invited user can do this.
    pub async fn decline_invite(
        &self,
        caller: &Caller,
        id: &EntityId,
    ) -> Result<Snapshot<Invitation>, PortalError<S::Error>> {
        let prior = self.load_invitation(id).await?;
        let invitation = &prior.record;

        if !invitation.involves(&caller.id) {
            return Err(PortalError::Forbidden(
                "only the users of an invitation can decline it".into(),
            ));
        }

        if invitation.status.is_terminal() {
            return Err(PortalError::Conflict(format!(
                "invitation {} is already {}",
                id, invitation.status
            )));
        }

        let declined = Invitation {
            status: InvitationStatus::Declined,
            responded_at: Some(self.clock.now()),
            ..invitation.clone()
        };
        let snapshot = self.invitations.commit(&prior, &declined).await?;

        debug!(invitation = %id, by = %caller.id, "declined invitation");
        Ok(snapshot)
    }

    /// Append a move for the side whose turn it is.
    ///
    /// The time passed since the previous move (or since the start of the game) is deducted from
    /// the clock of the moving side, at most `max_move_deduction` per move. If the clock runs out
    /// the same version ends the game in favour of the opponent with reason "timeout".
    ///
    /// Two moves submitted from the same snapshot can not both succeed: the later commit fails
    /// with [`PortalError::ConcurrentWrite`] and nothing is written for it.
    pub async fn make_move(
        &self,
        caller: &Caller,
        id: &EntityId,
        mv: &str,
    ) -> Result<Snapshot<Game>, PortalError<S::Error>> {
        let mv = mv.trim();
        if mv.is_empty() {
            return Err(PortalError::InvalidInput("move can not be empty".into()));
        }

        let prior = self.load_game(id).await?;
        let game = &prior.record;

        if game.status.is_terminal() {
            return Err(PortalError::Conflict(format!(
                "game {} is already finished ({})",
                id, game.status
            )));
        }

        let Some(side) = game.side_of(&caller.id) else {
            return Err(PortalError::Forbidden(format!(
                "{} is not playing in game {}",
                caller.id, id
            )));
        };

        if side != game.side_to_move() {
            return Err(PortalError::Forbidden(format!(
                "it is {}'s turn in game {}",
                game.side_to_move(),
                id
            )));
        }

        let now = self.clock.now();
        let elapsed = now
            .saturating_since(game.last_move_at)
            .min(self.config.max_move_deduction);

        let mut next = game.clone();
        let remaining = next.clock(side).saturating_sub(elapsed);
        *next.clock_mut(side) = remaining;
        next.moves.push(mv.to_string());
        next.last_move_at = now;

        if remaining == Duration::ZERO {
            next.status = side.opponent().victory();
            next.reason = Some("timeout".into());
        }

        let snapshot = self.games.commit(&prior, &next).await?;

        debug!(
            game = %id,
            %side,
            ply = snapshot.record.moves.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            status = %snapshot.record.status,
            "committed move"
        );
        Ok(snapshot)
    }

    /// End an active game with a result reported by one of its players.
    ///
    /// The result is not checked against the moves played: the rules are enforced by the
    /// players' clients which report the outcome (checkmate, stalemate, resignation, agreed
    /// draw). Moves and clocks are kept as they are.
    pub async fn finish_game(
        &self,
        caller: &Caller,
        id: &EntityId,
        status: GameStatus,
        reason: &str,
    ) -> Result<Snapshot<Game>, PortalError<S::Error>> {
        if !status.is_terminal() {
            return Err(PortalError::InvalidInput(format!(
                "{} is not a final game status",
                status
            )));
        }

        let prior = self.load_game(id).await?;
        let game = &prior.record;

        if game.side_of(&caller.id).is_none() {
            return Err(PortalError::Forbidden(format!(
                "{} is not playing in game {}",
                caller.id, id
            )));
        }

        if game.status.is_terminal() {
            return Err(PortalError::Conflict(format!(
                "game {} is already finished ({})",
                id, game.status
            )));
        }

        let finished = Game {
            status,
            reason: Some(reason.trim().to_string()).filter(|reason| !reason.is_empty()),
            ..game.clone()
        };
        let snapshot = self.games.commit(&prior, &finished).await?;

        debug!(game = %id, by = %caller.id, %status, "finished game");
        Ok(snapshot)
    }

    pub async fn invitation(
        &self,
        id: &EntityId,
    ) -> Result<Snapshot<Invitation>, PortalError<S::Error>> {
        self.load_invitation(id).await
    }

    /// Pending invitations sent or received by a user, oldest first.
    pub async fn pending_invitations(
        &self,
        user: &UserId,
    ) -> Result<Vec<Snapshot<Invitation>>, PortalError<S::Error>> {
        let filter = Filter::Or(vec![
            Filter::equals("from_id", user),
            Filter::equals("to_id", user),
        ]);
        Ok(self
            .invitations
            .load_where(&filter)
            .await?
            .into_iter()
            .filter(|snapshot| {
                snapshot.record.status == InvitationStatus::Pending
                    && snapshot.record.involves(user)
            })
            .collect())
    }

    pub async fn game(&self, id: &EntityId) -> Result<Snapshot<Game>, PortalError<S::Error>> {
        self.load_game(id).await
    }

    /// Every stored version of a game, oldest first.
    ///
    /// Each revision shows the moves and clocks as they were written by that version.
    pub async fn game_timeline(
        &self,
        id: &EntityId,
    ) -> Result<Vec<GameRevision>, PortalError<S::Error>> {
        let rows = self.games.history(id).await?;
        if rows.is_empty() {
            return Err(PortalError::NotFound {
                kind: "games",
                id: *id,
            });
        }

        Ok(rows
            .iter()
            .map(|row| GameRevision {
                version: row.version(),
                game: row.to_record::<Game>(),
            })
            .collect())
    }

    /// Games of a user which are still being played, oldest first.
    pub async fn active_games(
        &self,
        user: &UserId,
    ) -> Result<Vec<Snapshot<Game>>, PortalError<S::Error>> {
        Ok(self
            .games_of(user)
            .await?
            .into_iter()
            .filter(|snapshot| snapshot.record.status == GameStatus::Active)
            .collect())
    }

    /// Finished games of a user, most recent first.
    pub async fn results(&self, user: &UserId) -> Result<Vec<GameResult>, PortalError<S::Error>> {
        Ok(results_of(user, &self.games_of(user).await?))
    }

    pub async fn tally(&self, user: &UserId) -> Result<Tally, PortalError<S::Error>> {
        Ok(tally_of(user, &self.games_of(user).await?))
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, PortalError<S::Error>> {
        Ok(leaderboard(&self.games.load_all().await?))
    }

    /// Replace the display name of a player on all their games.
    ///
    /// Names are denormalised onto games, every game still showing another name gets a new
    /// version. Returns the number of games renamed.
    pub async fn rename_player(
        &self,
        caller: &Caller,
        user: &UserId,
        name: &str,
    ) -> Result<usize, PortalError<S::Error>> {
        if !caller.is(user) && !caller.admin {
            return Err(PortalError::Forbidden(
                "only administrators can rename other players".into(),
            ));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(PortalError::InvalidInput("name can not be empty".into()));
        }

        let mut renamed = 0;
        for prior in self.games_of(user).await? {
            let mut next = prior.record.clone();
            if next.white == *user {
                next.white_name = name.to_string();
            }
            if next.black == *user {
                next.black_name = name.to_string();
            }
            if next == prior.record {
                continue;
            }

            self.games.commit(&prior, &next).await?;
            renamed += 1;
        }

        debug!(%user, renamed, "renamed player");
        Ok(renamed)
    }

    async fn games_of(&self, user: &UserId) -> Result<Vec<Snapshot<Game>>, PortalError<S::Error>> {
        let filter = Filter::Or(vec![
            Filter::equals("white_id", user),
            Filter::equals("black_id", user),
        ]);
        Ok(self
            .games
            .load_where(&filter)
            .await?
            .into_iter()
            .filter(|snapshot| snapshot.record.side_of(user).is_some())
            .collect())
    }

    async fn load_invitation(
        &self,
        id: &EntityId,
    ) -> Result<Snapshot<Invitation>, PortalError<S::Error>> {
        self.invitations
            .load(id)
            .await?
            .ok_or(PortalError::NotFound {
                kind: "invitations",
                id: *id,
            })
    }

    async fn load_game(&self, id: &EntityId) -> Result<Snapshot<Game>, PortalError<S::Error>> {
        self.games.load(id).await?.ok_or(PortalError::NotFound {
            kind: "games",
            id: *id,
        })
    }
}
