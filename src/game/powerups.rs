//! Powerup kinds and their effect table

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Base movement speed (px per input event)
pub const BASE_PLAYER_SPEED: f32 = 4.0;
/// Base blast radius of a thrown bomb
pub const BASE_EXPLOSION_RADIUS: f32 = 120.0;
/// Concurrent bombs allowed without MULTI_BOMB slots
pub const BASE_MAX_BOMBS: u32 = 1;
/// Health restored by a HEALTH pickup
pub const HEALTH_PICKUP_AMOUNT: f32 = 30.0;
/// Pickup distance between an actor and a powerup
pub const PICKUP_RADIUS: f32 = 35.0;

/// Every kind of powerup that can appear in the arena.
///
/// Declaration order is the order modifiers are applied in, so SLOW and
/// FREEZE always win over SPEED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerupKind {
    Speed,
    Range,
    MultiBomb,
    Shield,
    Health,
    Homing,
    Invis,
    Freeze,
    Slow,
    Reverse,
    NoBomb,
}

/// Stats recomputed from scratch every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedStats {
    pub speed: f32,
    pub range: f32,
    pub max_bombs: u32,
    pub invulnerable: bool,
}

impl Default for DerivedStats {
    fn default() -> Self {
        Self {
            speed: BASE_PLAYER_SPEED,
            range: BASE_EXPLOSION_RADIUS,
            max_bombs: BASE_MAX_BOMBS,
            invulnerable: false,
        }
    }
}

/// Static description of a powerup kind
#[derive(Clone, Copy)]
pub struct PowerupSpec {
    /// How long a timed effect lasts (0 = instant)
    pub duration_ms: u64,
    /// Helpful pickups land on the picker, debuffs on the opponent
    pub target_self: bool,
    /// Modifier applied to derived stats while the effect is active
    pub apply: fn(&mut DerivedStats),
}

fn no_modifier(_: &mut DerivedStats) {}

fn speed_boost(stats: &mut DerivedStats) {
    stats.speed *= 1.6;
}

fn range_boost(stats: &mut DerivedStats) {
    stats.range *= 1.5;
}

fn shield(stats: &mut DerivedStats) {
    stats.invulnerable = true;
}

fn freeze(stats: &mut DerivedStats) {
    stats.speed = 0.0;
}

fn slow(stats: &mut DerivedStats) {
    stats.speed *= 0.5;
}

impl PowerupKind {
    pub const ALL: [PowerupKind; 11] = [
        PowerupKind::Speed,
        PowerupKind::Range,
        PowerupKind::MultiBomb,
        PowerupKind::Shield,
        PowerupKind::Health,
        PowerupKind::Homing,
        PowerupKind::Invis,
        PowerupKind::Freeze,
        PowerupKind::Slow,
        PowerupKind::Reverse,
        PowerupKind::NoBomb,
    ];

    pub fn spec(self) -> PowerupSpec {
        let (duration_ms, target_self, apply): (u64, bool, fn(&mut DerivedStats)) = match self {
            PowerupKind::Speed => (8_000, true, speed_boost),
            PowerupKind::Range => (10_000, true, range_boost),
            PowerupKind::MultiBomb => (10_000, true, no_modifier),
            PowerupKind::Shield => (8_000, true, shield),
            PowerupKind::Health => (0, true, no_modifier),
            PowerupKind::Homing => (0, true, no_modifier),
            PowerupKind::Invis => (6_000, true, no_modifier),
            PowerupKind::Freeze => (2_000, false, freeze),
            PowerupKind::Slow => (5_000, false, slow),
            PowerupKind::Reverse => (5_000, false, no_modifier),
            PowerupKind::NoBomb => (4_000, false, no_modifier),
        };
        PowerupSpec {
            duration_ms,
            target_self,
            apply,
        }
    }

    /// Uniformly random kind
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}
