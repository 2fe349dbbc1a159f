//! Bot AI: pursuit, bomb throwing, danger avoidance

use rand::Rng;

use super::combat::launch_speed;
use super::entities::{ActorId, Bomb, Bot, Obstacle};
use super::physics::{PhysicsSystem, ACTOR_RADIUS, ARENA_HEIGHT, ARENA_WIDTH, WALL_MARGIN};

pub const BOT_MAX_HEALTH: f32 = 100.0;
/// Pixels per tick
pub const BOT_SPEED: f32 = 2.5;
/// Retarget interval bounds (ms)
pub const BOT_DECISION_MIN_MS: u64 = 400;
pub const BOT_DECISION_MAX_MS: u64 = 900;
/// Bombs are only thrown at targets closer than this
pub const BOT_ENGAGE_DISTANCE: f32 = 300.0;
/// Chance to throw when a decision finds a target in range
pub const BOT_BOMB_CHANCE: f64 = 0.35;
/// Bombs closer than this are fled from
pub const BOT_DANGER_RADIUS: f32 = 150.0;
/// Obstacles closer than this push the bot away
const BOT_OBSTACLE_REPEL_RADIUS: f32 = 50.0;
const BOT_OBSTACLE_REPEL_STRENGTH: f32 = 1.5;

impl Bot {
    /// Run one tick of bot AI: decide, steer, move.
    /// Returns a bomb when the bot decides to throw one.
    pub fn think(
        &mut self,
        targets: &[(f32, f32)],
        bombs: &[Bomb],
        obstacles: &[Obstacle],
        rng: &mut impl Rng,
        now: u64,
    ) -> Option<Bomb> {
        let mut thrown = None;

        if now >= self.next_decision_at {
            self.next_decision_at = now + rng.gen_range(BOT_DECISION_MIN_MS..=BOT_DECISION_MAX_MS);
            thrown = self.retarget(targets, rng, now);
        }

        let (mut move_x, mut move_y) = (self.dir_x, self.dir_y);

        let threat = bombs
            .iter()
            .map(|b| (b, PhysicsSystem::distance(self.x, self.y, b.x, b.y)))
            .filter(|(_, d)| *d < BOT_DANGER_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((bomb, _)) = threat {
            (move_x, move_y) = PhysicsSystem::normalize(self.x - bomb.x, self.y - bomb.y);
        }

        for obstacle in obstacles {
            let (dist, cx, cy) = PhysicsSystem::distance_to_rect(self.x, self.y, obstacle);
            let clearance = dist - ACTOR_RADIUS;
            if dist > 0.0 && clearance < BOT_OBSTACLE_REPEL_RADIUS {
                let weight = BOT_OBSTACLE_REPEL_STRENGTH
                    * (1.0 - clearance.max(0.0) / BOT_OBSTACLE_REPEL_RADIUS);
                move_x += (self.x - cx) / dist * weight;
                move_y += (self.y - cy) / dist * weight;
            }
        }

        let (move_x, move_y) = PhysicsSystem::normalize(move_x, move_y);
        self.step(move_x, move_y, obstacles, now);

        thrown
    }

    /// Aim at the nearest target and maybe throw a bomb at it
    fn retarget(&mut self, targets: &[(f32, f32)], rng: &mut impl Rng, now: u64) -> Option<Bomb> {
        let (tx, ty, dist) = targets
            .iter()
            .map(|(x, y)| (*x, *y, PhysicsSystem::distance(self.x, self.y, *x, *y)))
            .min_by(|a, b| a.2.total_cmp(&b.2))?;

        let (dx, dy) = PhysicsSystem::normalize(tx - self.x, ty - self.y);
        self.dir_x = dx;
        self.dir_y = dy;

        let can_throw = self.active_bombs < self.max_bombs;
        if dist < BOT_ENGAGE_DISTANCE && can_throw && rng.gen_bool(BOT_BOMB_CHANCE) {
            let charge = (dist / BOT_ENGAGE_DISTANCE).clamp(0.2, 1.0);
            self.active_bombs += 1;
            return Some(Bomb::launch(
                ActorId::Bot,
                self.x,
                self.y,
                dy.atan2(dx),
                launch_speed(self.range, charge),
                self.range,
                false,
                now,
            ));
        }

        None
    }

    /// Integrate movement with wall reflection and obstacle resolution
    fn step(&mut self, move_x: f32, move_y: f32, obstacles: &[Obstacle], now: u64) {
        let mut nx = self.x + move_x * self.speed;
        let mut ny = self.y + move_y * self.speed;

        let (min_x, max_x) = (WALL_MARGIN, ARENA_WIDTH - WALL_MARGIN);
        let (min_y, max_y) = (WALL_MARGIN, ARENA_HEIGHT - WALL_MARGIN);

        if nx < min_x || nx > max_x {
            self.dir_x = -self.dir_x;
            nx = nx.clamp(min_x, max_x);
            self.next_decision_at = now;
        }
        if ny < min_y || ny > max_y {
            self.dir_y = -self.dir_y;
            ny = ny.clamp(min_y, max_y);
            self.next_decision_at = now;
        }

        let (rx, ry) = PhysicsSystem::resolve_entity_obstacles(nx, ny, ACTOR_RADIUS, obstacles);
        (self.x, self.y) = PhysicsSystem::clamp_to_arena(rx, ry);

        if move_x != 0.0 || move_y != 0.0 {
            self.heading = move_y.atan2(move_x) + std::f32::consts::FRAC_PI_2;
        }
    }
}
