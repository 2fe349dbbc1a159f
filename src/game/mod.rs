//! Game simulation modules

pub mod arena;
pub mod bot;
pub mod combat;
pub mod entities;
pub mod r#match;
pub mod physics;
pub mod powerups;
pub mod rating;
pub mod simulation;
pub mod snapshot;

pub use entities::{ConnId, PlayerIdentity};
pub use r#match::{GameMatch, MatchCommand, MatchRegistry};
pub use rating::RatingLedger;
pub use simulation::MatchSettings;

use serde::{Deserialize, Serialize};

/// Directional and bomb input as sent by the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub bomb: bool,
}

impl InputState {
    /// Raw (unnormalized) movement vector; screen y grows downward
    pub fn direction(&self) -> (f32, f32) {
        let mut dx = 0.0;
        let mut dy = 0.0;
        if self.up {
            dy -= 1.0;
        }
        if self.down {
            dy += 1.0;
        }
        if self.left {
            dx -= 1.0;
        }
        if self.right {
            dx += 1.0;
        }
        (dx, dy)
    }
}
