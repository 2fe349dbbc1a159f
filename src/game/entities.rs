//! Entity records owned by a match

use std::collections::BTreeMap;

use uuid::Uuid;

use super::arena::SPAWN_POINTS;
use super::bot::{BOT_MAX_HEALTH, BOT_SPEED};
use super::combat::{launch_speed, BOMB_CHARGE_MAX, BOMB_FUSE_MS};
use super::physics::{ARENA_HEIGHT, ARENA_WIDTH};
use super::powerups::{DerivedStats, PowerupKind, BASE_EXPLOSION_RADIUS, BASE_MAX_BOMBS};

/// Transport-level connection identifier
pub type ConnId = Uuid;

/// Maximum (and starting) player health
pub const MAX_HEALTH: f32 = 100.0;
/// Fixed starting hit points of an obstacle
pub const OBSTACLE_HP: i32 = 75;
/// Collision radius of a bomb in flight
pub const BOMB_RADIUS: f32 = 8.0;
/// Collision radius of powerups and trap bombs
pub const ITEM_RADIUS: f32 = 15.0;
/// Visual offset of the held bomb relative to the player sprite
const HELD_BOMB_OFFSET: (f32, f32) = (21.0, -8.0);
/// Fraction of the flight at each end of the arc during which a bomb is low
const LOW_FLIGHT_WINDOW: f32 = 0.2;

/// Anything that can own a bomb or take damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorId {
    Player(ConnId),
    Bot,
}

/// Identity record supplied by the account system
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerIdentity {
    pub id: Uuid,
    pub username: String,
    pub rating: i32,
}

/// Player state in a match (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub conn_id: ConnId,
    /// Join order, 0 or 1; selects the spawn point
    pub slot: usize,
    pub identity: PlayerIdentity,

    // Position and facing
    pub x: f32,
    pub y: f32,
    /// Sprite rotation; the player faces `heading - PI/2`
    pub heading: f32,

    pub health: f32,

    // Derived every tick from active powerups
    pub speed: f32,
    pub range: f32,
    pub max_bombs: u32,
    pub invulnerable: bool,

    pub active_bombs: u32,
    /// Powerup kind -> expiry timestamp (ms)
    pub effects: BTreeMap<PowerupKind, u64>,
    pub homing_charges: u32,
    /// Expiry timestamps of MULTI_BOMB grants, +1 max bombs each
    pub multi_bomb_slots: Vec<u64>,

    pub bomb_charge: u32,
    pub charging: bool,
}

impl Player {
    pub fn new(conn_id: ConnId, slot: usize, identity: PlayerIdentity) -> Self {
        let (x, y, heading) = SPAWN_POINTS[slot.min(SPAWN_POINTS.len() - 1)];
        let base = DerivedStats::default();
        Self {
            conn_id,
            slot,
            identity,
            x,
            y,
            heading,
            health: MAX_HEALTH,
            speed: base.speed,
            range: base.range,
            max_bombs: base.max_bombs,
            invulnerable: base.invulnerable,
            active_bombs: 0,
            effects: BTreeMap::new(),
            homing_charges: 0,
            multi_bomb_slots: Vec::new(),
            bomb_charge: 0,
            charging: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn has_effect(&self, kind: PowerupKind, now: u64) -> bool {
        self.effects.get(&kind).is_some_and(|expiry| now < *expiry)
    }

    pub fn apply_damage(&mut self, amount: f32) {
        self.health = (self.health - amount).clamp(0.0, MAX_HEALTH);
    }

    pub fn heal(&mut self, amount: f32) {
        self.health = (self.health + amount).clamp(0.0, MAX_HEALTH);
    }

    /// Rebuild speed, range, bomb capacity and shield from active effects,
    /// pruning anything expired.
    pub fn refresh_stats(&mut self, now: u64) {
        let mut stats = DerivedStats::default();

        self.multi_bomb_slots.retain(|expiry| now < *expiry);
        stats.max_bombs += self.multi_bomb_slots.len() as u32;

        self.effects.retain(|_, expiry| now < *expiry);
        for kind in self.effects.keys() {
            (kind.spec().apply)(&mut stats);
        }

        self.speed = stats.speed;
        self.range = stats.range;
        self.max_bombs = stats.max_bombs;
        self.invulnerable = stats.invulnerable;
    }

    /// Launch the charged bomb in the facing direction.
    /// Consumes one homing charge if available.
    pub fn release_bomb(&mut self, now: u64) -> Bomb {
        let charge = self.bomb_charge as f32 / BOMB_CHARGE_MAX as f32;
        let facing = self.heading - std::f32::consts::FRAC_PI_2;

        let (off_x, off_y) = HELD_BOMB_OFFSET;
        let (sin, cos) = self.heading.sin_cos();
        let start_x = self.x + (off_x * cos - off_y * sin);
        let start_y = self.y + (off_x * sin + off_y * cos);

        let homing = self.homing_charges > 0;
        if homing {
            self.homing_charges -= 1;
        }

        self.active_bombs += 1;
        self.bomb_charge = 0;
        self.charging = false;

        Bomb::launch(
            ActorId::Player(self.conn_id),
            start_x,
            start_y,
            facing,
            launch_speed(self.range, charge),
            self.range,
            homing,
            now,
        )
    }
}

/// Bomb in flight
#[derive(Debug, Clone)]
pub struct Bomb {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    /// Velocity in px/ms
    pub vx: f32,
    pub vy: f32,
    /// None for chain-reaction blasts
    pub owner: Option<ActorId>,
    pub range: f32,
    pub explode_at: u64,
    pub created_at: u64,
    pub homing: bool,
}

impl Bomb {
    #[allow(clippy::too_many_arguments)]
    pub fn launch(
        owner: ActorId,
        x: f32,
        y: f32,
        angle: f32,
        speed: f32,
        range: f32,
        homing: bool,
        now: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            x,
            y,
            vx: angle.cos() * speed,
            vy: angle.sin() * speed,
            owner: Some(owner),
            range,
            explode_at: now + BOMB_FUSE_MS,
            created_at: now,
            homing,
        }
    }

    /// Normalized flight time in [0, 1]
    pub fn flight_progress(&self, now: u64) -> f32 {
        let total = self.explode_at.saturating_sub(self.created_at).max(1) as f32;
        (now.saturating_sub(self.created_at) as f32 / total).clamp(0.0, 1.0)
    }

    /// Low enough to hit obstacles (outside the apex of the arc)
    pub fn is_low(&self, now: u64) -> bool {
        let t = self.flight_progress(now);
        t < LOW_FLIGHT_WINDOW || t > 1.0 - LOW_FLIGHT_WINDOW
    }
}

/// Destructible axis-aligned block
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub half_w: f32,
    pub half_h: f32,
    pub hp: i32,
    /// Dropped when the obstacle is destroyed
    pub loot: PowerupKind,
}

impl Obstacle {
    pub fn new(id: u32, x: f32, y: f32, half_w: f32, half_h: f32, loot: PowerupKind) -> Self {
        Self {
            id,
            x,
            y,
            half_w,
            half_h,
            hp: OBSTACLE_HP,
            loot,
        }
    }

    pub fn left(&self) -> f32 {
        self.x - self.half_w
    }

    pub fn right(&self) -> f32 {
        self.x + self.half_w
    }

    pub fn top(&self) -> f32 {
        self.y - self.half_h
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.half_h
    }
}

/// Collectible lying in the arena
#[derive(Debug, Clone)]
pub struct Powerup {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub kind: PowerupKind,
}

impl Powerup {
    pub fn new(x: f32, y: f32, kind: PowerupKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            x,
            y,
            kind,
        }
    }
}

/// Static mine that detonates when an actor comes close
#[derive(Debug, Clone)]
pub struct TrapBomb {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
}

impl TrapBomb {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            x,
            y,
        }
    }
}

/// AI opponent, spawned once per match
#[derive(Debug, Clone)]
pub struct Bot {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub health: f32,
    pub speed: f32,
    pub range: f32,
    pub max_bombs: u32,
    pub active_bombs: u32,
    /// Next retarget timestamp (ms)
    pub next_decision_at: u64,
    /// Current pursuit direction (unit vector)
    pub dir_x: f32,
    pub dir_y: f32,
    /// Last melee contact damage timestamp (ms)
    pub last_hit_at: u64,
}

impl Bot {
    pub fn spawn(now: u64) -> Self {
        Self {
            x: ARENA_WIDTH / 2.0,
            y: ARENA_HEIGHT / 2.0,
            heading: 0.0,
            health: BOT_MAX_HEALTH,
            speed: BOT_SPEED,
            range: BASE_EXPLOSION_RADIUS,
            max_bombs: BASE_MAX_BOMBS,
            active_bombs: 0,
            next_decision_at: now,
            dir_x: 0.0,
            dir_y: 0.0,
            last_hit_at: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn apply_damage(&mut self, amount: f32) {
        self.health = (self.health - amount).clamp(0.0, BOT_MAX_HEALTH);
    }

    pub fn heal(&mut self, amount: f32) {
        self.health = (self.health + amount).clamp(0.0, BOT_MAX_HEALTH);
    }

    /// The bot never carries timed powerups, so this only restores base stats
    pub fn refresh_stats(&mut self) {
        self.speed = BOT_SPEED;
        self.range = BASE_EXPLOSION_RADIUS;
        self.max_bombs = BASE_MAX_BOMBS;
    }
}
