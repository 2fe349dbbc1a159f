//! Authoritative match simulation
//!
//! `MatchState` owns every entity of one match. It is driven by two entry
//! points: `handle_input` whenever a client sends input, and `tick` at the
//! fixed simulation rate. Anything clients need to hear about is queued as a
//! `MatchEvent` and drained by the owning task.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::tick_delta_ms;
use crate::ws::protocol::GameOverReason;

use super::arena::ArenaGenerator;
use super::combat::{
    CombatSystem, BOMB_CHARGE_MAX, BOMB_CHARGE_STEP, BOMB_WALL_MARGIN, CONTACT_DAMAGE,
    CONTACT_RADIUS, HOMING_BLEND, HOMING_TRIGGER_RADIUS, OBSTACLE_BLAST_DAMAGE,
    OBSTACLE_BLAST_SLACK, POWERUP_CHAIN_FACTOR, TRAP_BLAST_RADIUS, TRAP_TRIGGER_RADIUS,
};
use super::entities::{
    ActorId, Bomb, Bot, ConnId, Obstacle, Player, PlayerIdentity, Powerup, TrapBomb,
    BOMB_RADIUS, ITEM_RADIUS,
};
use super::physics::{PhysicsSystem, ACTOR_RADIUS, ARENA_HEIGHT, ARENA_WIDTH};
use super::powerups::{PowerupKind, HEALTH_PICKUP_AMOUNT, PICKUP_RADIUS};
use super::rating::{Outcome, RatingAdjuster};
use super::InputState;

/// Human participants per match
pub const MAX_PLAYERS: usize = 2;

/// Per-match tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSettings {
    /// Match length once started
    pub duration_secs: u32,
    /// Elapsed time after start before the bot joins
    pub bot_spawn_delay_ms: u64,
    pub bot_enabled: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            duration_secs: 120,
            bot_spawn_delay_ms: 30_000,
            bot_enabled: true,
        }
    }
}

/// Rating change applied to one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingChange {
    pub conn_id: ConnId,
    pub player_id: Uuid,
    pub delta: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameOverSummary {
    pub winner: Option<ConnId>,
    pub reason: GameOverReason,
    pub rating_changes: Vec<RatingChange>,
}

/// Something clients must be told about outside the per-tick state
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    Explosion { x: f32, y: f32, range: f32 },
    GameOver(GameOverSummary),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("match is full")]
    MatchFull,
    #[error("connection already joined this match")]
    AlreadyJoined,
    #[error("match is over")]
    MatchOver,
}

/// What happened when a connection left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    NotInMatch,
    /// Left before the match started (or after it ended)
    Removed { now_empty: bool },
    /// Left a running match; the opponent wins
    Forfeited,
}

/// Match state (owned by the match task)
pub struct MatchState {
    pub id: Uuid,
    pub settings: MatchSettings,
    pub players: HashMap<ConnId, Player>,
    pub bombs: Vec<Bomb>,
    pub powerups: Vec<Powerup>,
    pub obstacles: Vec<Obstacle>,
    pub trap_bombs: Vec<TrapBomb>,
    pub bot: Option<Bot>,
    pub started: bool,
    pub ended: bool,
    pub started_at: u64,
    /// Seconds remaining
    pub time_left: u32,
    bot_spawned: bool,
    /// Cooldown shared by the two players' melee contact
    last_contact_at: u64,
    arena: ArenaGenerator,
    rng: ChaCha8Rng,
    events: Vec<MatchEvent>,
}

impl MatchState {
    pub fn new(id: Uuid, seed: u64, settings: MatchSettings) -> Self {
        Self {
            id,
            time_left: settings.duration_secs,
            settings,
            players: HashMap::new(),
            bombs: Vec::new(),
            powerups: Vec::new(),
            obstacles: Vec::new(),
            trap_bombs: Vec::new(),
            bot: None,
            started: false,
            ended: false,
            started_at: 0,
            bot_spawned: false,
            last_contact_at: 0,
            arena: ArenaGenerator::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            events: Vec::new(),
        }
    }

    /// Add a participant. Returns `true` when this join started the match.
    pub fn add_player(
        &mut self,
        conn_id: ConnId,
        identity: PlayerIdentity,
        now: u64,
    ) -> Result<bool, JoinError> {
        if self.ended {
            return Err(JoinError::MatchOver);
        }
        if self.players.contains_key(&conn_id) {
            return Err(JoinError::AlreadyJoined);
        }
        let slot = (0..MAX_PLAYERS)
            .find(|slot| self.players.values().all(|p| p.slot != *slot))
            .ok_or(JoinError::MatchFull)?;

        self.players
            .insert(conn_id, Player::new(conn_id, slot, identity));

        if self.players.len() == MAX_PLAYERS {
            self.start(now);
            return Ok(true);
        }
        Ok(false)
    }

    fn start(&mut self, now: u64) {
        let layout = self.arena.generate(&mut self.rng);
        self.obstacles = layout.obstacles;
        self.trap_bombs = layout.trap_bombs;
        self.started = true;
        self.started_at = now;
        self.time_left = self.settings.duration_secs;

        info!(
            match_id = %self.id,
            obstacles = self.obstacles.len(),
            trap_bombs = self.trap_bombs.len(),
            "Match started"
        );
    }

    /// Handle a connection leaving the match
    pub fn remove_player(&mut self, conn_id: ConnId) -> LeaveOutcome {
        if !self.players.contains_key(&conn_id) {
            return LeaveOutcome::NotInMatch;
        }

        if self.started && !self.ended {
            self.forfeit(conn_id);
            return LeaveOutcome::Forfeited;
        }

        self.players.remove(&conn_id);
        LeaveOutcome::Removed {
            now_empty: self.players.is_empty(),
        }
    }

    pub fn is_over(&self) -> bool {
        self.ended
    }

    /// Take all events queued since the last call
    pub fn drain_events(&mut self) -> Vec<MatchEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn opponent_of(&self, conn_id: ConnId) -> Option<&Player> {
        self.players.values().find(|p| p.conn_id != conn_id)
    }

    /// Participants in join order
    pub fn players_by_slot(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.slot);
        players
    }

    /// Apply one input event. Movement is applied immediately, not per tick.
    pub fn handle_input(&mut self, conn_id: ConnId, input: &InputState, now: u64) {
        if !self.started || self.ended {
            debug!(match_id = %self.id, conn_id = %conn_id, "Input outside a running match dropped");
            return;
        }
        let Some(player) = self.players.get_mut(&conn_id) else {
            return;
        };
        if !player.is_alive() {
            return;
        }

        let (mut dx, mut dy) = input.direction();
        if player.has_effect(PowerupKind::Reverse, now) {
            dx = -dx;
            dy = -dy;
        }
        let (dx, dy) = PhysicsSystem::normalize(dx, dy);

        if dx != 0.0 || dy != 0.0 {
            let next_x = player.x + dx * player.speed;
            let next_y = player.y + dy * player.speed;

            // Each axis moves on its own so actors slide along obstacle edges
            let blocked_x = self
                .obstacles
                .iter()
                .any(|o| PhysicsSystem::circle_hits_rect(next_x, player.y, ACTOR_RADIUS, o));
            let blocked_y = self
                .obstacles
                .iter()
                .any(|o| PhysicsSystem::circle_hits_rect(player.x, next_y, ACTOR_RADIUS, o));

            if !blocked_x {
                player.x = next_x;
            }
            if !blocked_y {
                player.y = next_y;
            }
            player.heading = dy.atan2(dx) + std::f32::consts::FRAC_PI_2;
        }

        (player.x, player.y) = PhysicsSystem::clamp_to_arena(player.x, player.y);

        let can_throw = player.active_bombs < player.max_bombs
            && !player.has_effect(PowerupKind::NoBomb, now);

        if input.bomb {
            if can_throw {
                player.charging = true;
                player.bomb_charge = (player.bomb_charge + BOMB_CHARGE_STEP).min(BOMB_CHARGE_MAX);
            }
        } else if player.charging {
            if can_throw {
                let bomb = player.release_bomb(now);
                self.bombs.push(bomb);
            } else {
                player.bomb_charge = 0;
                player.charging = false;
            }
        }
    }

    /// Advance the simulation by one tick
    pub fn tick(&mut self, now: u64) {
        if !self.started || self.ended {
            return;
        }

        self.spawn_bot_if_due(now);
        self.update_bot(now);

        self.resolve_contacts(now);
        if self.ended {
            return;
        }

        self.update_bombs(now);
        if self.ended {
            return;
        }

        self.refresh_stats(now);

        self.trigger_traps();
        if self.ended {
            return;
        }

        self.collect_powerups(now);
        self.update_clock(now);
    }

    fn spawn_bot_if_due(&mut self, now: u64) {
        if !self.settings.bot_enabled || self.bot_spawned {
            return;
        }
        if now.saturating_sub(self.started_at) >= self.settings.bot_spawn_delay_ms {
            self.bot = Some(Bot::spawn(now));
            self.bot_spawned = true;
            info!(match_id = %self.id, "Bot spawned");
        }
    }

    fn update_bot(&mut self, now: u64) {
        // Invisible players cannot be targeted
        let targets: Vec<(f32, f32)> = self
            .players
            .values()
            .filter(|p| p.is_alive() && !p.has_effect(PowerupKind::Invis, now))
            .map(|p| (p.x, p.y))
            .collect();

        if let Some(bot) = self.bot.as_mut() {
            if let Some(bomb) = bot.think(&targets, &self.bombs, &self.obstacles, &mut self.rng, now)
            {
                self.bombs.push(bomb);
            }
        }
    }

    fn resolve_contacts(&mut self, now: u64) {
        let live: Vec<ConnId> = self
            .players_by_slot()
            .into_iter()
            .filter(|p| p.is_alive())
            .map(|p| p.conn_id)
            .collect();

        if let [a, b] = live[..] {
            let (ax, ay) = (self.players[&a].x, self.players[&a].y);
            let (bx, by) = (self.players[&b].x, self.players[&b].y);

            if PhysicsSystem::distance(ax, ay, bx, by) < CONTACT_RADIUS {
                let (pushed_a, pushed_b) =
                    PhysicsSystem::resolve_actor_collision(ax, ay, ACTOR_RADIUS, bx, by, ACTOR_RADIUS);
                let hit = CombatSystem::contact_ready(self.last_contact_at, now);
                if hit {
                    self.last_contact_at = now;
                }
                for (conn_id, (x, y)) in [(a, pushed_a), (b, pushed_b)] {
                    if let Some(player) = self.players.get_mut(&conn_id) {
                        let (x, y) =
                            PhysicsSystem::resolve_entity_obstacles(x, y, ACTOR_RADIUS, &self.obstacles);
                        (player.x, player.y) = PhysicsSystem::clamp_to_arena(x, y);
                        if hit && !player.invulnerable {
                            player.apply_damage(CONTACT_DAMAGE);
                        }
                    }
                }
            }
        }

        for conn_id in live {
            let Some(bot) = self.bot.as_mut() else {
                break;
            };
            let Some(player) = self.players.get_mut(&conn_id) else {
                continue;
            };
            if PhysicsSystem::distance(player.x, player.y, bot.x, bot.y) >= CONTACT_RADIUS {
                continue;
            }

            let ((px, py), (bx, by)) = PhysicsSystem::resolve_actor_collision(
                player.x,
                player.y,
                ACTOR_RADIUS,
                bot.x,
                bot.y,
                ACTOR_RADIUS,
            );
            let (px, py) = PhysicsSystem::resolve_entity_obstacles(px, py, ACTOR_RADIUS, &self.obstacles);
            let (bx, by) = PhysicsSystem::resolve_entity_obstacles(bx, by, ACTOR_RADIUS, &self.obstacles);
            (player.x, player.y) = PhysicsSystem::clamp_to_arena(px, py);
            (bot.x, bot.y) = PhysicsSystem::clamp_to_arena(bx, by);

            if CombatSystem::contact_ready(bot.last_hit_at, now) {
                bot.last_hit_at = now;
                if !player.invulnerable {
                    player.apply_damage(CONTACT_DAMAGE);
                }
                bot.apply_damage(CONTACT_DAMAGE);
            }
        }

        self.remove_dead_bot();
        self.check_elimination();
    }

    fn update_bombs(&mut self, now: u64) {
        let delta = tick_delta_ms();
        let targets: Vec<(ConnId, f32, f32)> = self
            .players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| (p.conn_id, p.x, p.y))
            .collect();

        let mut detonating = Vec::new();

        for bomb in self.bombs.iter_mut() {
            if now >= bomb.explode_at {
                detonating.push(bomb.id);
                continue;
            }

            bomb.x += bomb.vx * delta;
            bomb.y += bomb.vy * delta;

            if bomb.x < BOMB_WALL_MARGIN || bomb.x > ARENA_WIDTH - BOMB_WALL_MARGIN {
                bomb.vx = -bomb.vx;
            }
            if bomb.y < BOMB_WALL_MARGIN || bomb.y > ARENA_HEIGHT - BOMB_WALL_MARGIN {
                bomb.vy = -bomb.vy;
            }

            if bomb.homing {
                let target = match bomb.owner {
                    Some(ActorId::Player(owner)) => targets
                        .iter()
                        .find(|(id, _, _)| *id != owner)
                        .map(|(_, x, y)| (*x, *y)),
                    _ => None,
                };
                if let Some((tx, ty)) = target {
                    let speed = (bomb.vx * bomb.vx + bomb.vy * bomb.vy).sqrt();
                    let (nx, ny) = PhysicsSystem::normalize(tx - bomb.x, ty - bomb.y);
                    bomb.vx += (nx * speed - bomb.vx) * HOMING_BLEND;
                    bomb.vy += (ny * speed - bomb.vy) * HOMING_BLEND;

                    if PhysicsSystem::distance(bomb.x, bomb.y, tx, ty) < HOMING_TRIGGER_RADIUS {
                        detonating.push(bomb.id);
                        continue;
                    }
                }
            }

            // Only low bombs touch obstacles; the apex of the arc clears them
            if bomb.is_low(now) {
                if let Some(o) = self
                    .obstacles
                    .iter()
                    .find(|o| PhysicsSystem::circle_hits_rect(bomb.x, bomb.y, BOMB_RADIUS, o))
                {
                    let across_x = (bomb.x - o.x).abs() / (o.half_w * 2.0);
                    let across_y = (bomb.y - o.y).abs() / (o.half_h * 2.0);
                    if across_x > across_y {
                        bomb.vx = -bomb.vx;
                    } else {
                        bomb.vy = -bomb.vy;
                    }
                }
            }

            let reach = BOMB_RADIUS + ITEM_RADIUS;
            let touches_item = self
                .powerups
                .iter()
                .any(|p| PhysicsSystem::distance(bomb.x, bomb.y, p.x, p.y) < reach)
                || self
                    .trap_bombs
                    .iter()
                    .any(|t| PhysicsSystem::distance(bomb.x, bomb.y, t.x, t.y) < reach);
            if touches_item {
                detonating.push(bomb.id);
            }
        }

        for id in detonating {
            if self.ended {
                break;
            }
            // Already consumed by an earlier blast this tick
            let Some(idx) = self.bombs.iter().position(|b| b.id == id) else {
                continue;
            };
            let bomb = self.bombs.remove(idx);
            self.explode(bomb.x, bomb.y, bomb.range, bomb.owner);
        }
    }

    fn refresh_stats(&mut self, now: u64) {
        for player in self.players.values_mut() {
            player.refresh_stats(now);
        }
        if let Some(bot) = self.bot.as_mut() {
            bot.refresh_stats();
        }
    }

    fn actor_positions(&self) -> Vec<(f32, f32)> {
        let mut positions: Vec<(f32, f32)> = self
            .players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| (p.x, p.y))
            .collect();
        if let Some(bot) = self.bot.as_ref() {
            positions.push((bot.x, bot.y));
        }
        positions
    }

    fn trigger_traps(&mut self) {
        let actors = self.actor_positions();
        let triggered: Vec<Uuid> = self
            .trap_bombs
            .iter()
            .filter(|t| {
                actors
                    .iter()
                    .any(|(x, y)| PhysicsSystem::distance(t.x, t.y, *x, *y) < TRAP_TRIGGER_RADIUS)
            })
            .map(|t| t.id)
            .collect();

        for id in triggered {
            let Some(idx) = self.trap_bombs.iter().position(|t| t.id == id) else {
                continue;
            };
            let trap = self.trap_bombs.remove(idx);
            self.explode(trap.x, trap.y, TRAP_BLAST_RADIUS, None);
        }
    }

    /// First live actor within `radius`, players before the bot
    fn actor_near(&self, x: f32, y: f32, radius: f32) -> Option<ActorId> {
        let player = self
            .players_by_slot()
            .into_iter()
            .filter(|p| p.is_alive())
            .find(|p| PhysicsSystem::distance(x, y, p.x, p.y) < radius)
            .map(|p| ActorId::Player(p.conn_id));

        player.or_else(|| {
            self.bot
                .as_ref()
                .filter(|b| PhysicsSystem::distance(x, y, b.x, b.y) < radius)
                .map(|_| ActorId::Bot)
        })
    }

    fn collect_powerups(&mut self, now: u64) {
        let mut remaining = Vec::with_capacity(self.powerups.len());
        for powerup in std::mem::take(&mut self.powerups) {
            match self.actor_near(powerup.x, powerup.y, PICKUP_RADIUS) {
                Some(actor) => self.apply_pickup(actor, powerup.kind, now),
                None => remaining.push(powerup),
            }
        }
        self.powerups = remaining;
    }

    fn apply_pickup(&mut self, picker: ActorId, kind: PowerupKind, now: u64) {
        let spec = kind.spec();

        let conn_id = match picker {
            ActorId::Bot => {
                if let (PowerupKind::Health, Some(bot)) = (kind, self.bot.as_mut()) {
                    bot.heal(HEALTH_PICKUP_AMOUNT);
                }
                return;
            }
            ActorId::Player(conn_id) => conn_id,
        };

        // Debuffs land on the opponent
        let target = if spec.target_self {
            Some(conn_id)
        } else {
            self.opponent_of(conn_id).map(|p| p.conn_id)
        };
        let Some(player) = target.and_then(|id| self.players.get_mut(&id)) else {
            return;
        };

        match kind {
            PowerupKind::Health => player.heal(HEALTH_PICKUP_AMOUNT),
            PowerupKind::MultiBomb => player.multi_bomb_slots.push(now + spec.duration_ms),
            PowerupKind::Homing => player.homing_charges += 1,
            _ => {
                player.effects.insert(kind, now + spec.duration_ms);
            }
        }
    }

    fn update_clock(&mut self, now: u64) {
        let elapsed_secs = now.saturating_sub(self.started_at) / 1000;
        let elapsed_secs = u32::try_from(elapsed_secs).unwrap_or(u32::MAX);
        self.time_left = self.settings.duration_secs.saturating_sub(elapsed_secs);

        if self.time_left == 0 {
            self.finish();
        }
    }

    /// Detonate a blast and resolve every chain reaction it sets off
    pub fn explode(&mut self, x: f32, y: f32, radius: f32, owner: Option<ActorId>) {
        self.detonate(x, y, radius, owner);
        self.check_elimination();
    }

    fn detonate(&mut self, x: f32, y: f32, radius: f32, owner: Option<ActorId>) {
        match owner {
            Some(ActorId::Player(conn_id)) => {
                if let Some(player) = self.players.get_mut(&conn_id) {
                    player.active_bombs = player.active_bombs.saturating_sub(1);
                }
            }
            Some(ActorId::Bot) => {
                if let Some(bot) = self.bot.as_mut() {
                    bot.active_bombs = bot.active_bombs.saturating_sub(1);
                }
            }
            None => {}
        }

        self.events.push(MatchEvent::Explosion { x, y, range: radius });

        // Capture chain candidates before touching anything, so a nested
        // blast never sees an entity this one already claimed
        let within = |ex: f32, ey: f32| PhysicsSystem::distance(x, y, ex, ey) < radius;
        let (caught_powerups, powerups): (Vec<Powerup>, Vec<Powerup>) =
            std::mem::take(&mut self.powerups)
                .into_iter()
                .partition(|p| within(p.x, p.y));
        let (caught_traps, traps): (Vec<TrapBomb>, Vec<TrapBomb>) =
            std::mem::take(&mut self.trap_bombs)
                .into_iter()
                .partition(|t| within(t.x, t.y));
        let (caught_bombs, bombs): (Vec<Bomb>, Vec<Bomb>) = std::mem::take(&mut self.bombs)
            .into_iter()
            .partition(|b| within(b.x, b.y));
        self.powerups = powerups;
        self.trap_bombs = traps;
        self.bombs = bombs;

        let mut drops = Vec::new();
        self.obstacles.retain_mut(|o| {
            if PhysicsSystem::distance(x, y, o.x, o.y) >= radius + OBSTACLE_BLAST_SLACK {
                return true;
            }
            o.hp -= OBSTACLE_BLAST_DAMAGE;
            if o.hp <= 0 {
                drops.push(Powerup::new(o.x, o.y, o.loot));
                return false;
            }
            true
        });

        for player in self.players.values_mut() {
            if !player.is_alive() || player.invulnerable {
                continue;
            }
            let dist = PhysicsSystem::distance(x, y, player.x, player.y);
            let damage = CombatSystem::explosion_damage(dist, radius);
            if damage > 0.0 {
                player.apply_damage(damage);
            }
        }

        if let Some(bot) = self.bot.as_mut() {
            let dist = PhysicsSystem::distance(x, y, bot.x, bot.y);
            bot.apply_damage(CombatSystem::explosion_damage(dist, radius));
        }
        self.remove_dead_bot();

        self.powerups.extend(drops);

        for powerup in caught_powerups {
            self.detonate(powerup.x, powerup.y, radius * POWERUP_CHAIN_FACTOR, None);
        }
        for trap in caught_traps {
            self.detonate(trap.x, trap.y, TRAP_BLAST_RADIUS, None);
        }
        for bomb in caught_bombs {
            self.detonate(bomb.x, bomb.y, bomb.range, bomb.owner);
        }
    }

    /// A dead bot leaves the match for good and drops a powerup
    fn remove_dead_bot(&mut self) {
        if !self.bot.as_ref().is_some_and(|b| !b.is_alive()) {
            return;
        }
        if let Some(bot) = self.bot.take() {
            let kind = PowerupKind::random(&mut self.rng);
            self.powerups.push(Powerup::new(bot.x, bot.y, kind));
            info!(match_id = %self.id, ?kind, "Bot destroyed");
        }
    }

    fn check_elimination(&mut self) {
        if !self.ended && self.players.values().any(|p| !p.is_alive()) {
            self.finish();
        }
    }

    /// End the match normally: health decides the winner, Elo decides ratings
    fn finish(&mut self) {
        if self.ended {
            return;
        }

        let pair = match self.players_by_slot()[..] {
            [a, b] => Some((
                (a.conn_id, a.health, a.identity.rating),
                (b.conn_id, b.health, b.identity.rating),
            )),
            _ => None,
        };
        let Some((first, second)) = pair else {
            self.end(None, GameOverReason::Finished, Vec::new());
            return;
        };

        let outcome = Outcome::from_health(first.1, second.1);
        let (d1, d2) = RatingAdjuster::elo_deltas(first.2, second.2, outcome);
        let winner = match outcome {
            Outcome::FirstWins => Some(first.0),
            Outcome::SecondWins => Some(second.0),
            Outcome::Draw => None,
        };

        let changes = self.apply_rating_changes(&[(first.0, d1), (second.0, d2)]);
        self.end(winner, GameOverReason::Finished, changes);
    }

    /// End the match because `quitter` left mid-game
    fn forfeit(&mut self, quitter: ConnId) {
        if self.ended {
            return;
        }

        let winner = self.opponent_of(quitter).map(|p| p.conn_id);
        let (penalty, reward) = RatingAdjuster::forfeit_deltas();

        let mut deltas = vec![(quitter, penalty)];
        if let Some(winner) = winner {
            deltas.push((winner, reward));
        }

        let changes = self.apply_rating_changes(&deltas);
        self.end(winner, GameOverReason::OpponentLeft, changes);
    }

    fn apply_rating_changes(&mut self, deltas: &[(ConnId, i32)]) -> Vec<RatingChange> {
        deltas
            .iter()
            .filter_map(|(conn_id, delta)| {
                let player = self.players.get_mut(conn_id)?;
                player.identity.rating += delta;
                Some(RatingChange {
                    conn_id: *conn_id,
                    player_id: player.identity.id,
                    delta: *delta,
                })
            })
            .collect()
    }

    fn end(&mut self, winner: Option<ConnId>, reason: GameOverReason, rating_changes: Vec<RatingChange>) {
        if self.ended {
            return;
        }
        self.ended = true;

        info!(
            match_id = %self.id,
            winner = ?winner,
            reason = ?reason,
            "Match ended"
        );

        self.events.push(MatchEvent::GameOver(GameOverSummary {
            winner,
            reason,
            rating_changes,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combat::{MAX_DAMAGE, MIN_DAMAGE};
    use crate::game::entities::MAX_HEALTH;
    use crate::game::physics::WALL_MARGIN;
    use crate::game::powerups::BASE_EXPLOSION_RADIUS;
    use rand::Rng;

    const T0: u64 = 1_000_000;

    fn identity(name: &str, rating: i32) -> PlayerIdentity {
        PlayerIdentity {
            id: Uuid::new_v4(),
            username: name.to_string(),
            rating,
        }
    }

    fn no_bot() -> MatchSettings {
        MatchSettings {
            bot_enabled: false,
            ..MatchSettings::default()
        }
    }

    /// Started two-player match with an empty arena
    fn started_match(settings: MatchSettings) -> (MatchState, ConnId, ConnId) {
        let mut state = MatchState::new(Uuid::new_v4(), 7, settings);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(state.add_player(a, identity("ana", 500), T0), Ok(false));
        assert_eq!(state.add_player(b, identity("bo", 500), T0), Ok(true));
        state.obstacles.clear();
        state.trap_bombs.clear();
        state.powerups.clear();
        (state, a, b)
    }

    fn explosions(events: &[MatchEvent]) -> Vec<(f32, f32, f32)> {
        events
            .iter()
            .filter_map(|e| match e {
                MatchEvent::Explosion { x, y, range } => Some((*x, *y, *range)),
                _ => None,
            })
            .collect()
    }

    fn game_overs(events: &[MatchEvent]) -> Vec<GameOverSummary> {
        events
            .iter()
            .filter_map(|e| match e {
                MatchEvent::GameOver(summary) => Some(summary.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn second_join_starts_match_and_third_is_rejected() {
        let mut state = MatchState::new(Uuid::new_v4(), 1, no_bot());
        let a = Uuid::new_v4();
        assert_eq!(state.add_player(a, identity("ana", 500), T0), Ok(false));
        assert_eq!(
            state.add_player(a, identity("ana", 500), T0),
            Err(JoinError::AlreadyJoined)
        );
        assert!(!state.started);

        assert_eq!(state.add_player(Uuid::new_v4(), identity("bo", 500), T0), Ok(true));
        assert!(state.started);
        assert!(!state.obstacles.is_empty());

        assert_eq!(
            state.add_player(Uuid::new_v4(), identity("cy", 500), T0),
            Err(JoinError::MatchFull)
        );

        let spawns: Vec<(f32, f32)> = state.players_by_slot().iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(spawns, vec![(100.0, 400.0), (1500.0, 400.0)]);
    }

    #[test]
    fn leaving_before_start_empties_the_match() {
        let mut state = MatchState::new(Uuid::new_v4(), 1, no_bot());
        let a = Uuid::new_v4();
        state.add_player(a, identity("ana", 500), T0).unwrap();

        assert_eq!(state.remove_player(a), LeaveOutcome::Removed { now_empty: true });
        assert_eq!(state.remove_player(a), LeaveOutcome::NotInMatch);
        assert!(state.drain_events().is_empty());
    }

    #[test]
    fn input_before_start_is_ignored() {
        let mut state = MatchState::new(Uuid::new_v4(), 1, no_bot());
        let a = Uuid::new_v4();
        state.add_player(a, identity("ana", 500), T0).unwrap();

        let input = InputState {
            right: true,
            ..InputState::default()
        };
        state.handle_input(a, &input, T0);
        assert_eq!(state.players[&a].x, 100.0);
    }

    #[test]
    fn reverse_inverts_movement() {
        let (mut state, a, _) = started_match(no_bot());
        state
            .players
            .get_mut(&a)
            .unwrap()
            .effects
            .insert(PowerupKind::Reverse, T0 + 5_000);

        let up = InputState {
            up: true,
            ..InputState::default()
        };
        state.handle_input(a, &up, T0);

        let player = &state.players[&a];
        assert!((player.y - 404.0).abs() < 0.001, "moved to {}", player.y);
    }

    #[test]
    fn movement_slides_along_obstacles() {
        let (mut state, a, _) = started_match(no_bot());
        // Block directly to the right of the player
        state.obstacles.push(Obstacle::new(0, 151.0, 400.0, 30.0, 30.0, PowerupKind::Speed));

        let diagonal = InputState {
            right: true,
            down: true,
            ..InputState::default()
        };
        state.handle_input(a, &diagonal, T0);

        let player = &state.players[&a];
        assert_eq!(player.x, 100.0);
        assert!(player.y > 400.0);
    }

    #[test]
    fn charge_and_release_throws_one_bomb() {
        let (mut state, a, _) = started_match(no_bot());
        let hold = InputState {
            bomb: true,
            ..InputState::default()
        };
        for _ in 0..10 {
            state.handle_input(a, &hold, T0);
        }
        assert_eq!(state.players[&a].bomb_charge, 10 * BOMB_CHARGE_STEP);
        assert!(state.players[&a].charging);

        state.handle_input(a, &InputState::default(), T0);
        assert_eq!(state.bombs.len(), 1);
        assert_eq!(state.players[&a].active_bombs, 1);

        // At capacity: holding does not charge, releasing throws nothing
        state.handle_input(a, &hold, T0);
        state.handle_input(a, &InputState::default(), T0);
        assert_eq!(state.bombs.len(), 1);
        assert_eq!(state.players[&a].bomb_charge, 0);
    }

    #[test]
    fn no_bomb_debuff_cancels_the_charge() {
        let (mut state, a, _) = started_match(no_bot());
        let hold = InputState {
            bomb: true,
            ..InputState::default()
        };
        state.handle_input(a, &hold, T0);
        state
            .players
            .get_mut(&a)
            .unwrap()
            .effects
            .insert(PowerupKind::NoBomb, T0 + 4_000);
        state.handle_input(a, &InputState::default(), T0);

        assert!(state.bombs.is_empty());
        assert!(!state.players[&a].charging);
        assert_eq!(state.players[&a].active_bombs, 0);
    }

    #[test]
    fn blast_damage_falls_off_linearly() {
        let (mut state, a, b) = started_match(no_bot());
        state.explode(1440.0, 400.0, 120.0, None);

        let expected = MAX_HEALTH - (MIN_DAMAGE + (MAX_DAMAGE - MIN_DAMAGE) * 0.5);
        assert!((state.players[&b].health - expected).abs() < 0.001);
        assert_eq!(state.players[&a].health, MAX_HEALTH);
        assert_eq!(explosions(&state.drain_events()), vec![(1440.0, 400.0, 120.0)]);
    }

    #[test]
    fn shield_blocks_blast_damage() {
        let (mut state, _, b) = started_match(no_bot());
        state.players.get_mut(&b).unwrap().invulnerable = true;
        state.explode(1500.0, 400.0, 120.0, None);
        assert_eq!(state.players[&b].health, MAX_HEALTH);
    }

    #[test]
    fn trap_triggers_once_at_its_own_position() {
        let (mut state, a, _) = started_match(no_bot());
        state.trap_bombs.push(TrapBomb::new(800.0, 400.0));
        {
            let player = state.players.get_mut(&a).unwrap();
            player.x = 800.0;
            player.y = 430.0;
        }

        state.tick(T0 + 16);

        assert!(state.trap_bombs.is_empty());
        let events = state.drain_events();
        assert_eq!(explosions(&events), vec![(800.0, 400.0, BASE_EXPLOSION_RADIUS)]);
        assert!(state.players[&a].health < MAX_HEALTH);

        state.tick(T0 + 32);
        assert!(explosions(&state.drain_events()).is_empty());
    }

    #[test]
    fn chained_bomb_releases_its_owner_slot_once() {
        let (mut state, a, _) = started_match(no_bot());
        let bomb = state.players.get_mut(&a).unwrap().release_bomb(T0);
        let (bx, by) = (bomb.x, bomb.y);
        state.bombs.push(bomb);
        assert_eq!(state.players[&a].active_bombs, 1);

        // Trap blast next to the bomb sets it off
        state.explode(bx + 10.0, by, 50.0, None);

        assert!(state.bombs.is_empty());
        assert_eq!(state.players[&a].active_bombs, 0);
        assert_eq!(explosions(&state.drain_events()).len(), 2);

        // A later blast with the same owner must not underflow
        state.explode(800.0, 100.0, 10.0, Some(ActorId::Player(a)));
        assert_eq!(state.players[&a].active_bombs, 0);
    }

    #[test]
    fn caught_powerup_chains_at_reduced_radius() {
        let (mut state, _, _) = started_match(no_bot());
        state.powerups.push(Powerup::new(800.0, 400.0, PowerupKind::Speed));

        state.explode(850.0, 400.0, 100.0, None);

        assert!(state.powerups.is_empty());
        let blasts = explosions(&state.drain_events());
        assert_eq!(blasts.len(), 2);
        assert_eq!(blasts[1].0, 800.0);
        assert!((blasts[1].2 - 100.0 * POWERUP_CHAIN_FACTOR).abs() < 0.001);
    }

    #[test]
    fn destroyed_obstacle_drops_its_loot() {
        let (mut state, _, _) = started_match(no_bot());
        let mut obstacle = Obstacle::new(3, 800.0, 400.0, 30.0, 30.0, PowerupKind::Range);
        obstacle.hp = OBSTACLE_BLAST_DAMAGE;
        state.obstacles.push(obstacle);
        state
            .obstacles
            .push(Obstacle::new(4, 800.0, 200.0, 30.0, 30.0, PowerupKind::Speed));

        // Within radius + slack of the first obstacle only
        state.explode(940.0, 400.0, 120.0, None);

        assert_eq!(state.obstacles.len(), 1);
        assert_eq!(state.obstacles[0].hp, 75);
        assert_eq!(state.powerups.len(), 1);
        assert_eq!(state.powerups[0].kind, PowerupKind::Range);
        assert_eq!((state.powerups[0].x, state.powerups[0].y), (800.0, 400.0));
    }

    #[test]
    fn elimination_ends_match_once_with_elo() {
        let (mut state, a, b) = started_match(no_bot());
        state.players.get_mut(&b).unwrap().health = 10.0;

        state.explode(1500.0, 400.0, 120.0, None);
        state.explode(1500.0, 400.0, 120.0, None);
        state.tick(T0 + 16);

        let overs = game_overs(&state.drain_events());
        assert_eq!(overs.len(), 1);
        let summary = &overs[0];
        assert_eq!(summary.winner, Some(a));
        assert_eq!(summary.reason, GameOverReason::Finished);

        let deltas: HashMap<ConnId, i32> = summary
            .rating_changes
            .iter()
            .map(|c| (c.conn_id, c.delta))
            .collect();
        assert_eq!(deltas[&a], 16);
        assert_eq!(deltas[&b], -16);
        assert_eq!(state.players[&a].identity.rating, 516);
        assert_eq!(state.players[&b].health, 0.0);
        assert!(state.is_over());
    }

    #[test]
    fn time_up_with_equal_health_is_a_draw() {
        let (mut state, _, _) = started_match(no_bot());
        state.tick(T0 + 60_000);
        assert_eq!(state.time_left, 60);
        assert!(!state.is_over());

        state.tick(T0 + 120_000);

        let overs = game_overs(&state.drain_events());
        assert_eq!(overs.len(), 1);
        assert_eq!(overs[0].winner, None);
        assert!(overs[0].rating_changes.iter().all(|c| c.delta == 0));
    }

    #[test]
    fn leaving_a_running_match_forfeits() {
        let (mut state, a, b) = started_match(no_bot());

        assert_eq!(state.remove_player(a), LeaveOutcome::Forfeited);

        let overs = game_overs(&state.drain_events());
        assert_eq!(overs.len(), 1);
        assert_eq!(overs[0].winner, Some(b));
        assert_eq!(overs[0].reason, GameOverReason::OpponentLeft);
        let deltas: HashMap<ConnId, i32> = overs[0]
            .rating_changes
            .iter()
            .map(|c| (c.conn_id, c.delta))
            .collect();
        assert_eq!(deltas[&a], -30);
        assert_eq!(deltas[&b], 15);

        // The other player leaving afterwards does not end it again
        state.remove_player(b);
        assert!(game_overs(&state.drain_events()).is_empty());
    }

    #[test]
    fn pickups_help_the_taker_and_debuffs_hit_the_opponent() {
        let (mut state, a, b) = started_match(no_bot());
        state.players.get_mut(&a).unwrap().health = 50.0;
        for kind in [
            PowerupKind::Speed,
            PowerupKind::Slow,
            PowerupKind::Health,
            PowerupKind::MultiBomb,
            PowerupKind::Homing,
        ] {
            state.powerups.push(Powerup::new(110.0, 400.0, kind));
        }

        state.tick(T0 + 16);

        assert!(state.powerups.is_empty());
        let picker = &state.players[&a];
        assert_eq!(picker.health, 80.0);
        assert!(picker.effects.contains_key(&PowerupKind::Speed));
        assert!(!picker.effects.contains_key(&PowerupKind::Slow));
        assert_eq!(picker.multi_bomb_slots.len(), 1);
        assert_eq!(picker.homing_charges, 1);
        assert!(state.players[&b].has_effect(PowerupKind::Slow, T0 + 100));

        // Effects show up in derived stats on the next tick
        state.tick(T0 + 32);
        assert_eq!(state.players[&a].max_bombs, 2);
        assert!(state.players[&b].speed < state.players[&a].speed);
    }

    #[test]
    fn bot_spawns_once_after_delay() {
        let settings = MatchSettings {
            bot_spawn_delay_ms: 1_000,
            ..MatchSettings::default()
        };
        let (mut state, _, _) = started_match(settings);

        state.tick(T0 + 999);
        assert!(state.bot.is_none());
        state.tick(T0 + 1_000);
        let (bx, by) = {
            let bot = state.bot.as_ref().unwrap();
            (bot.x, bot.y)
        };

        state.bot.as_mut().unwrap().health = 5.0;
        state.explode(bx, by, 120.0, None);

        assert!(state.bot.is_none());
        assert_eq!(state.powerups.len(), 1);
        assert!(!state.is_over());

        state.tick(T0 + 5_000);
        assert!(state.bot.is_none());
    }

    #[test]
    fn player_contact_deals_damage_on_cooldown() {
        let (mut state, a, b) = started_match(no_bot());
        for (id, x) in [(a, 790.0), (b, 810.0)] {
            let player = state.players.get_mut(&id).unwrap();
            player.x = x;
            player.y = 400.0;
        }

        state.tick(T0 + 16);
        assert_eq!(state.players[&a].health, MAX_HEALTH - CONTACT_DAMAGE);
        assert_eq!(state.players[&b].health, MAX_HEALTH - CONTACT_DAMAGE);
        let gap = state.players[&b].x - state.players[&a].x;
        assert!(gap >= ACTOR_RADIUS * 2.0);
    }

    #[test]
    fn homing_bomb_detonates_near_opponent() {
        let (mut state, a, b) = started_match(no_bot());
        {
            let target = state.players.get_mut(&b).unwrap();
            target.x = 400.0;
        }
        let mut bomb = Bomb::launch(ActorId::Player(a), 385.0, 400.0, 0.0, 0.2, 120.0, true, T0);
        bomb.explode_at = T0 + 10_000;
        state.bombs.push(bomb);
        state.players.get_mut(&a).unwrap().active_bombs = 1;

        state.tick(T0 + 16);

        assert!(state.bombs.is_empty());
        assert_eq!(state.players[&a].active_bombs, 0);
        assert!(state.players[&b].health < MAX_HEALTH);
    }

    /// Slow bomb owned by `owner`, launched at `launched_at` along +x
    fn bomb_moving_right(owner: ConnId, x: f32, y: f32, launched_at: u64) -> Bomb {
        Bomb::launch(ActorId::Player(owner), x, y, 0.0, 0.2, 120.0, false, launched_at)
    }

    #[test]
    fn low_bomb_bounces_off_obstacles_but_clears_them_at_apex() {
        let (mut state, a, _) = started_match(no_bot());
        state
            .obstacles
            .push(Obstacle::new(0, 800.0, 400.0, 30.0, 30.0, PowerupKind::Speed));

        // Just thrown: low
        state.bombs.push(bomb_moving_right(a, 765.0, 400.0, T0));
        state.tick(T0 + 16);
        assert!(state.bombs[0].vx < 0.0);

        // Half way through the fuse: at the top of the arc
        state.bombs.clear();
        state.bombs.push(bomb_moving_right(a, 765.0, 400.0, T0 - 500));
        state.tick(T0 + 32);
        assert!(state.bombs[0].vx > 0.0);
        assert_eq!(state.obstacles[0].hp, 75);
    }

    #[test]
    fn bomb_bounces_off_arena_walls() {
        let (mut state, a, _) = started_match(no_bot());
        state.bombs.push(bomb_moving_right(a, ARENA_WIDTH - 16.0, 100.0, T0));

        state.tick(T0 + 16);

        let bomb = &state.bombs[0];
        assert!(bomb.vx < 0.0);
        assert_eq!(bomb.vy, 0.0);
    }

    #[test]
    fn bomb_touching_a_powerup_detonates_and_chains() {
        let (mut state, a, _) = started_match(no_bot());
        state.powerups.push(Powerup::new(800.0, 400.0, PowerupKind::Speed));
        state.bombs.push(bomb_moving_right(a, 780.0, 400.0, T0));
        state.players.get_mut(&a).unwrap().active_bombs = 1;

        state.tick(T0 + 16);

        assert!(state.bombs.is_empty());
        assert!(state.powerups.is_empty());
        assert_eq!(state.players[&a].active_bombs, 0);

        let blasts = explosions(&state.drain_events());
        assert_eq!(blasts.len(), 2);
        assert_eq!(blasts[0].2, 120.0);
        assert_eq!((blasts[1].0, blasts[1].1), (800.0, 400.0));
        assert!((blasts[1].2 - 120.0 * POWERUP_CHAIN_FACTOR).abs() < 0.001);
    }

    #[test]
    fn bomb_touching_a_trap_sets_it_off() {
        let (mut state, a, _) = started_match(no_bot());
        state.trap_bombs.push(TrapBomb::new(800.0, 400.0));
        state.bombs.push(bomb_moving_right(a, 780.0, 400.0, T0));
        state.players.get_mut(&a).unwrap().active_bombs = 1;

        state.tick(T0 + 16);

        assert!(state.bombs.is_empty());
        assert!(state.trap_bombs.is_empty());
        assert_eq!(state.players[&a].active_bombs, 0);

        let blasts = explosions(&state.drain_events());
        assert_eq!(blasts.len(), 2);
        assert_eq!(blasts[1], (800.0, 400.0, TRAP_BLAST_RADIUS));
    }

    #[test]
    fn bot_only_gains_health_from_pickups() {
        let (mut state, a, b) = started_match(no_bot());
        let mut bot = Bot::spawn(T0);
        bot.health = 50.0;
        let (bx, by) = (bot.x, bot.y);
        state.bot = Some(bot);
        for kind in [PowerupKind::Speed, PowerupKind::Slow, PowerupKind::Health] {
            state.powerups.push(Powerup::new(bx, by, kind));
        }

        state.tick(T0 + 16);

        assert!(state.powerups.is_empty());
        let bot = state.bot.as_ref().unwrap();
        assert_eq!(bot.health, 80.0);
        assert_eq!(bot.speed, crate::game::bot::BOT_SPEED);
        assert!(state.players[&a].effects.is_empty());
        assert!(state.players[&b].effects.is_empty());
    }

    #[test]
    fn no_bombs_detonate_after_the_match_ends() {
        let (mut state, a, b) = started_match(no_bot());
        state.players.get_mut(&b).unwrap().health = 10.0;
        state.players.get_mut(&a).unwrap().active_bombs = 2;
        for x in [1500.0, 800.0] {
            let mut bomb = bomb_moving_right(a, x, 400.0, T0);
            bomb.explode_at = T0;
            state.bombs.push(bomb);
        }

        state.tick(T0 + 16);

        let events = state.drain_events();
        assert_eq!(explosions(&events), vec![(1500.0, 400.0, 120.0)]);
        assert!(matches!(events.last(), Some(MatchEvent::GameOver(_))));
        assert_eq!(state.bombs.len(), 1);
        assert_eq!(state.players[&a].active_bombs, 1);
        assert_eq!(state.players[&a].health, MAX_HEALTH);
    }

    #[test]
    fn actors_stay_inside_arena_under_random_input() {
        let settings = MatchSettings {
            bot_spawn_delay_ms: 0,
            ..MatchSettings::default()
        };
        let mut state = MatchState::new(Uuid::new_v4(), 11, settings);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        state.add_player(a, identity("ana", 500), T0).unwrap();
        state.add_player(b, identity("bo", 500), T0).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let in_bounds = |x: f32, y: f32| {
            (WALL_MARGIN..=ARENA_WIDTH - WALL_MARGIN).contains(&x)
                && (WALL_MARGIN..=ARENA_HEIGHT - WALL_MARGIN).contains(&y)
        };

        for step in 0..3_000u64 {
            let now = T0 + step * 16;
            for conn in [a, b] {
                let input = InputState {
                    up: rng.gen_bool(0.3),
                    down: rng.gen_bool(0.3),
                    left: rng.gen_bool(0.3),
                    right: rng.gen_bool(0.3),
                    bomb: rng.gen_bool(0.5),
                };
                state.handle_input(conn, &input, now);
            }
            state.tick(now);

            for player in state.players.values() {
                assert!(in_bounds(player.x, player.y), "player at ({}, {})", player.x, player.y);
                assert!((0.0..=MAX_HEALTH).contains(&player.health));
            }
            if let Some(bot) = &state.bot {
                assert!(in_bounds(bot.x, bot.y), "bot at ({}, {})", bot.x, bot.y);
            }
            if state.is_over() {
                break;
            }
        }

        assert!(game_overs(&state.drain_events()).len() <= 1);
    }
}
