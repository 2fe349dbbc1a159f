//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::powerups::PowerupKind;
use crate::game::InputState;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Bind an account to this connection
    Identify {
        /// Account id issued by the account service
        id: Uuid,
    },

    /// Ask to be paired with an opponent
    FindMatch,

    /// Current input state, sent whenever it changes or every frame
    PlayerInput(InputState),
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Identity accepted
    Identified {
        rating: i32,
    },

    /// Action requires an identified connection
    AuthError {
        message: String,
    },

    /// Parked in the waiting slot
    WaitingForOpponent,

    /// Match created and started
    MatchFound {
        match_id: Uuid,
        players: Vec<PlayerSnapshot>,
        obstacles: Vec<ObstacleSnapshot>,
        trap_bombs: Vec<TrapBombSnapshot>,
    },

    /// Full match state, sent every tick
    ServerUpdate {
        players: Vec<PlayerSnapshot>,
        bombs: Vec<BombSnapshot>,
        powerups: Vec<PowerupSnapshot>,
        obstacles: Vec<ObstacleSnapshot>,
        trap_bombs: Vec<TrapBombSnapshot>,
        /// Seconds remaining
        time_left: u32,
        bot: Option<BotSnapshot>,
    },

    /// A blast went off
    Explosion {
        x: f32,
        y: f32,
        range: f32,
    },

    /// Match has ended
    GameOver {
        players: Vec<PlayerSnapshot>,
        winner_id: Option<Uuid>,
        reason: GameOverReason,
        /// Connection id -> rating delta
        trophy_changes: HashMap<Uuid, i32>,
    },
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameOverReason {
    Finished,
    OpponentLeft,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Connection id
    pub id: Uuid,
    pub username: String,
    /// Rating, already adjusted once the match is over
    pub trophies: i32,
    pub x: f32,
    pub y: f32,
    /// Rotation in radians
    pub rotation: f32,
    /// Health (0-100)
    pub hp: f32,
    pub speed: f32,
    pub range: f32,
    pub active_bombs: u32,
    pub max_bombs: u32,
    pub is_invulnerable: bool,
    pub is_invisible: bool,
    /// Active timed effects with their expiry (ms since epoch)
    pub powerups: HashMap<PowerupKind, u64>,
    pub homing_charges: u32,
    pub bomb_charge: u32,
    pub is_charging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BombSnapshot {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Owning connection; None for bot bombs
    pub owner_id: Option<Uuid>,
    pub from_bot: bool,
    pub range: f32,
    pub explode_time: u64,
    /// Lets the client draw the arc
    pub start_time: u64,
    pub homing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObstacleSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub hp: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerupSnapshot {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "type")]
    pub kind: PowerupKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrapBombSnapshot {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSnapshot {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub active_bombs: u32,
}
