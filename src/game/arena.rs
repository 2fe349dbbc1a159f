//! Procedural arena layout: obstacles and trap bombs

use rand::Rng;

use super::entities::{Obstacle, TrapBomb, ITEM_RADIUS};
use super::physics::{PhysicsSystem, ARENA_HEIGHT, ARENA_WIDTH};
use super::powerups::PowerupKind;

/// Player spawn points (x, y, heading); slot 0 faces right, slot 1 faces left
pub const SPAWN_POINTS: [(f32, f32, f32); 2] = [
    (100.0, 400.0, std::f32::consts::FRAC_PI_2),
    (1500.0, 400.0, -std::f32::consts::FRAC_PI_2),
];

/// Layout constraints for one arena
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub obstacle_count: usize,
    pub trap_count: usize,
    /// Candidate draws per item before giving up on it
    pub max_attempts: u32,
    pub obstacle_half_size: f32,
    /// Keep-out distance between obstacles and spawn points
    pub spawn_clearance: f32,
    /// Gap required between neighbouring obstacles
    pub obstacle_padding: f32,
    /// Candidates are drawn this far from every wall
    pub edge_inset: f32,
    pub trap_spawn_clearance: f32,
    /// Gap required between a trap and any obstacle
    pub trap_obstacle_margin: f32,
    pub trap_min_spacing: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            obstacle_count: 16,
            trap_count: 6,
            max_attempts: 100,
            obstacle_half_size: 30.0,
            spawn_clearance: 150.0,
            obstacle_padding: 15.0,
            edge_inset: 150.0,
            trap_spawn_clearance: 200.0,
            trap_obstacle_margin: 20.0,
            trap_min_spacing: 150.0,
        }
    }
}

/// Generated layout
#[derive(Debug, Clone, Default)]
pub struct ArenaLayout {
    pub obstacles: Vec<Obstacle>,
    pub trap_bombs: Vec<TrapBomb>,
}

/// Rejection-sampling arena generator.
///
/// Items that find no valid spot within the attempt budget are skipped, so a
/// crowded configuration yields fewer items instead of failing.
pub struct ArenaGenerator {
    config: ArenaConfig,
}

impl ArenaGenerator {
    pub fn new(config: ArenaConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, rng: &mut impl Rng) -> ArenaLayout {
        let obstacles = self.place_obstacles(rng);
        let trap_bombs = self.place_traps(rng, &obstacles);
        ArenaLayout {
            obstacles,
            trap_bombs,
        }
    }

    fn candidate(&self, rng: &mut impl Rng) -> (f32, f32) {
        let inset = self.config.edge_inset;
        let x = rng.gen_range(inset..(ARENA_WIDTH - inset)).floor();
        let y = rng.gen_range(inset..(ARENA_HEIGHT - inset)).floor();
        (x, y)
    }

    fn near_spawn(x: f32, y: f32, clearance: f32) -> bool {
        SPAWN_POINTS
            .iter()
            .any(|(sx, sy, _)| PhysicsSystem::distance(x, y, *sx, *sy) < clearance)
    }

    fn place_obstacles(&self, rng: &mut impl Rng) -> Vec<Obstacle> {
        let cfg = &self.config;
        let half = cfg.obstacle_half_size;
        let mut placed: Vec<Obstacle> = Vec::with_capacity(cfg.obstacle_count);

        for id in 0..cfg.obstacle_count {
            for _ in 0..cfg.max_attempts {
                let (x, y) = self.candidate(rng);

                if Self::near_spawn(x, y, cfg.spawn_clearance) {
                    continue;
                }

                let overlaps = placed.iter().any(|o| {
                    x + half + cfg.obstacle_padding > o.left()
                        && x - half - cfg.obstacle_padding < o.right()
                        && y + half + cfg.obstacle_padding > o.top()
                        && y - half - cfg.obstacle_padding < o.bottom()
                });
                if overlaps {
                    continue;
                }

                let loot = PowerupKind::random(rng);
                placed.push(Obstacle::new(id as u32, x, y, half, half, loot));
                break;
            }
        }

        placed
    }

    fn place_traps(&self, rng: &mut impl Rng, obstacles: &[Obstacle]) -> Vec<TrapBomb> {
        let cfg = &self.config;
        let mut traps: Vec<TrapBomb> = Vec::with_capacity(cfg.trap_count);

        for _ in 0..cfg.trap_count {
            for _ in 0..cfg.max_attempts {
                let (x, y) = self.candidate(rng);

                if Self::near_spawn(x, y, cfg.trap_spawn_clearance) {
                    continue;
                }

                let reach = ITEM_RADIUS + cfg.trap_obstacle_margin;
                if obstacles
                    .iter()
                    .any(|o| PhysicsSystem::circle_hits_rect(x, y, reach, o))
                {
                    continue;
                }

                if traps
                    .iter()
                    .any(|t| PhysicsSystem::distance(x, y, t.x, t.y) < cfg.trap_min_spacing)
                {
                    continue;
                }

                traps.push(TrapBomb::new(x, y));
                break;
            }
        }

        traps
    }
}

impl Default for ArenaGenerator {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}
