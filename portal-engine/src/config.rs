// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration of the portal state machines.
use std::time::Duration;

/// Time control of new games.
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Time both sides start with.
    pub initial_clock: Duration,

    /// Upper bound of what a single move can cost a side, no matter how long the move took.
    pub max_move_deduction: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            initial_clock: Duration::from_secs(10 * 60),
            max_move_deduction: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AccessConfig {
    /// Longest validity window an access request may ask for.
    pub max_validity: Duration,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_validity: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

/// Configuration parameters for all portal components.
#[derive(Clone, Debug, Default)]
pub struct PortalConfig {
    pub game: GameConfig,
    pub access: AccessConfig,
}
