//! Snapshot building: match state to wire messages

use std::collections::HashMap;

use crate::ws::protocol::{
    BombSnapshot, BotSnapshot, ObstacleSnapshot, PlayerSnapshot, PowerupSnapshot, ServerMsg,
    TrapBombSnapshot,
};

use super::bot::BOT_MAX_HEALTH;
use super::entities::{ActorId, Player};
use super::powerups::PowerupKind;
use super::simulation::{GameOverSummary, MatchState};

/// Builds full-state messages for network transmission
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn player(player: &Player, now: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            id: player.conn_id,
            username: player.identity.username.clone(),
            trophies: player.identity.rating,
            x: player.x,
            y: player.y,
            rotation: player.heading,
            hp: player.health,
            speed: player.speed,
            range: player.range,
            active_bombs: player.active_bombs,
            max_bombs: player.max_bombs,
            is_invulnerable: player.invulnerable,
            is_invisible: player.has_effect(PowerupKind::Invis, now),
            powerups: player
                .effects
                .iter()
                .filter(|(_, expiry)| now < **expiry)
                .map(|(kind, expiry)| (*kind, *expiry))
                .collect(),
            homing_charges: player.homing_charges,
            bomb_charge: player.bomb_charge,
            is_charging: player.charging,
        }
    }

    pub fn players(state: &MatchState, now: u64) -> Vec<PlayerSnapshot> {
        state
            .players_by_slot()
            .into_iter()
            .map(|p| Self::player(p, now))
            .collect()
    }

    fn obstacles(state: &MatchState) -> Vec<ObstacleSnapshot> {
        state
            .obstacles
            .iter()
            .map(|o| ObstacleSnapshot {
                id: o.id,
                x: o.x,
                y: o.y,
                w: o.half_w * 2.0,
                h: o.half_h * 2.0,
                hp: o.hp,
            })
            .collect()
    }

    fn trap_bombs(state: &MatchState) -> Vec<TrapBombSnapshot> {
        state
            .trap_bombs
            .iter()
            .map(|t| TrapBombSnapshot {
                id: t.id,
                x: t.x,
                y: t.y,
            })
            .collect()
    }

    /// Sent once to both players when the match starts
    pub fn match_found(state: &MatchState, now: u64) -> ServerMsg {
        ServerMsg::MatchFound {
            match_id: state.id,
            players: Self::players(state, now),
            obstacles: Self::obstacles(state),
            trap_bombs: Self::trap_bombs(state),
        }
    }

    /// Full state, sent every tick
    pub fn server_update(state: &MatchState, now: u64) -> ServerMsg {
        let bombs = state
            .bombs
            .iter()
            .map(|b| BombSnapshot {
                id: b.id,
                x: b.x,
                y: b.y,
                vx: b.vx,
                vy: b.vy,
                owner_id: match b.owner {
                    Some(ActorId::Player(conn_id)) => Some(conn_id),
                    _ => None,
                },
                from_bot: b.owner == Some(ActorId::Bot),
                range: b.range,
                explode_time: b.explode_at,
                start_time: b.created_at,
                homing: b.homing,
            })
            .collect();

        let powerups = state
            .powerups
            .iter()
            .map(|p| PowerupSnapshot {
                id: p.id,
                x: p.x,
                y: p.y,
                kind: p.kind,
            })
            .collect();

        let bot = state.bot.as_ref().map(|b| BotSnapshot {
            x: b.x,
            y: b.y,
            rotation: b.heading,
            hp: b.health,
            max_hp: BOT_MAX_HEALTH,
            active_bombs: b.active_bombs,
        });

        ServerMsg::ServerUpdate {
            players: Self::players(state, now),
            bombs,
            powerups,
            obstacles: Self::obstacles(state),
            trap_bombs: Self::trap_bombs(state),
            time_left: state.time_left,
            bot,
        }
    }

    /// Final standings; ratings in `players` already include the deltas
    pub fn game_over(state: &MatchState, summary: &GameOverSummary, now: u64) -> ServerMsg {
        let trophy_changes: HashMap<_, _> = summary
            .rating_changes
            .iter()
            .map(|c| (c.conn_id, c.delta))
            .collect();

        ServerMsg::GameOver {
            players: Self::players(state, now),
            winner_id: summary.winner,
            reason: summary.reason,
            trophy_changes,
        }
    }
}
