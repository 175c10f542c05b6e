// SPDX-License-Identifier: MIT OR Apache-2.0

//! State machines of the portal, built on append-only versioned records.
//!
//! Three entity families are modelled as mutable, contended entities on top of storage which
//! only appends rows:
//!
//! - [`GameEngine`]: invitations and two-player games with turn exclusivity and per-side clocks.
//! - [`AccessLifecycle`]: access requests, their review and the grants they fan out into.
//! - [`ReportDrafts`]: quarterly reports with a draft-then-submit lifecycle.
//!
//! Every operation takes the identity of the [`Caller`] and reads the current state of the
//! entity before validating the requested transition. If validation fails a typed
//! [`PortalError`] is returned and nothing is written. Otherwise the next full version of the
//! entity is appended with a _conditional append_: when another writer appended a version in the
//! meantime the operation fails with [`PortalError::ConcurrentWrite`] instead of silently
//! producing a second, conflicting transition. Nothing is retried automatically.
//!
//! ```
//! # use std::sync::Arc;
//! # use portal_core::SystemClock;
//! # use portal_engine::{Caller, GameStatus, Portal, PortalConfig};
//! # use portal_store::MemoryStore;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let portal = Portal::new(MemoryStore::new(), Arc::new(SystemClock), PortalConfig::default());
//!
//! let alice = Caller::new("alice", "Alice");
//! let bob = Caller::new("bob", "Bob");
//!
//! let invitation = portal.games.send_invite(&alice, &bob.id).await?;
//! let game = portal.games.accept_invite(&bob, &invitation.entity_id).await?;
//!
//! let white = if game.record.white == alice.id { &alice } else { &bob };
//! let game = portal.games.make_move(white, &game.entity_id, "e4").await?;
//! assert_eq!(game.record.moves, vec!["e4"]);
//! assert_eq!(game.record.status, GameStatus::Active);
//! # Ok(())
//! # }
//! ```
pub mod access;
mod caller;
mod config;
mod error;
pub mod game;
pub mod report;

use std::sync::Arc;

use portal_core::Clock;
use portal_store::RecordStore;

pub use access::{AccessLifecycle, AccessType, NewAccessRequest, ReviewAction};
pub use caller::Caller;
pub use config::{AccessConfig, GameConfig, PortalConfig};
pub use error::{PortalError, UnknownStatus};
pub use game::{GameEngine, GameStatus};
pub use report::{ReportDrafts, ReportPeriod, Section};

/// All portal components sharing one store and clock.
#[derive(Debug)]
pub struct Portal<S> {
    pub games: GameEngine<S>,
    pub access: AccessLifecycle<S>,
    pub reports: ReportDrafts<S>,
}

impl<S> Portal<S>
where
    S: RecordStore + Clone,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, config: PortalConfig) -> Self {
        Self {
            games: GameEngine::new(store.clone(), clock.clone(), config.game),
            access: AccessLifecycle::new(store.clone(), clock.clone(), config.access),
            reports: ReportDrafts::new(store, clock),
        }
    }
}
