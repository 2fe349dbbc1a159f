//! Combat rules - bomb launch, blast damage, melee contact

/// Fuse length of a thrown bomb
pub const BOMB_FUSE_MS: u64 = 1_000;
/// Charge accumulator cap
pub const BOMB_CHARGE_MAX: u32 = 1_000;
/// Charge gained per input event while the bomb input is held
pub const BOMB_CHARGE_STEP: u32 = 18;
/// Slowest possible throw (px/ms)
pub const MIN_LAUNCH_SPEED: f32 = 0.1;
/// Max throw speed per px of blast range
const LAUNCH_SPEED_PER_RANGE: f32 = 3.5 / BOMB_FUSE_MS as f32;

/// Damage at the very edge of a blast
pub const MIN_DAMAGE: f32 = 10.0;
/// Damage at the blast center
pub const MAX_DAMAGE: f32 = 40.0;
/// Obstacles are hit when their center is within radius + this slack
pub const OBSTACLE_BLAST_SLACK: f32 = 30.0;
/// Hit points an obstacle loses per blast
pub const OBSTACLE_BLAST_DAMAGE: i32 = 20;
/// Secondary blast radius factor for a powerup caught in an explosion
pub const POWERUP_CHAIN_FACTOR: f32 = 0.7;

/// Bombs bounce when they come this close to the arena edge
pub const BOMB_WALL_MARGIN: f32 = 15.0;
/// Per-tick blend of a homing bomb's velocity toward its target
pub const HOMING_BLEND: f32 = 0.08;
/// A homing bomb this close to its target detonates early
pub const HOMING_TRIGGER_RADIUS: f32 = 30.0;

/// Actors this close to a trap bomb set it off
pub const TRAP_TRIGGER_RADIUS: f32 = 40.0;
/// Blast radius of a trap bomb
pub const TRAP_BLAST_RADIUS: f32 = super::powerups::BASE_EXPLOSION_RADIUS;

/// Actors closer than this are in melee contact
pub const CONTACT_RADIUS: f32 = 40.0;
/// Damage per contact hit
pub const CONTACT_DAMAGE: f32 = 5.0;
/// Minimum time between two contact hits sharing a cooldown
pub const CONTACT_COOLDOWN_MS: u64 = 500;

/// Throw speed for a given blast range and charge fraction
pub fn launch_speed(range: f32, charge: f32) -> f32 {
    let max_speed = range * LAUNCH_SPEED_PER_RANGE;
    MIN_LAUNCH_SPEED + (max_speed - MIN_LAUNCH_SPEED) * charge.clamp(0.0, 1.0)
}

/// Combat system for damage calculations
pub struct CombatSystem;

impl CombatSystem {
    /// Linear falloff from MAX_DAMAGE at the center to MIN_DAMAGE at the edge,
    /// zero at or beyond the radius.
    pub fn explosion_damage(distance: f32, radius: f32) -> f32 {
        if radius <= 0.0 || distance >= radius {
            return 0.0;
        }
        MIN_DAMAGE + (MAX_DAMAGE - MIN_DAMAGE) * (1.0 - distance / radius)
    }

    /// Whether a contact cooldown has elapsed
    pub fn contact_ready(last_hit_at: u64, now: u64) -> bool {
        now.saturating_sub(last_hit_at) >= CONTACT_COOLDOWN_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_at_half_radius() {
        let dmg = CombatSystem::explosion_damage(60.0, 120.0);
        assert!((dmg - (MIN_DAMAGE + (MAX_DAMAGE - MIN_DAMAGE) * 0.5)).abs() < 0.0001);
    }

    #[test]
    fn damage_never_increases_with_distance() {
        let mut previous = f32::MAX;
        for step in 0..=200 {
            let dmg = CombatSystem::explosion_damage(step as f32, 150.0);
            assert!(dmg <= previous);
            previous = dmg;
        }
        assert_eq!(CombatSystem::explosion_damage(150.0, 150.0), 0.0);
        assert_eq!(CombatSystem::explosion_damage(400.0, 150.0), 0.0);
    }

    #[test]
    fn launch_speed_scales_with_charge_and_range() {
        assert!((launch_speed(120.0, 0.0) - MIN_LAUNCH_SPEED).abs() < 0.0001);
        assert!((launch_speed(120.0, 1.0) - 0.42).abs() < 0.0001);
        assert!(launch_speed(180.0, 1.0) > launch_speed(120.0, 1.0));
    }

    #[test]
    fn contact_cooldown() {
        assert!(CombatSystem::contact_ready(0, 500));
        assert!(!CombatSystem::contact_ready(1_000, 1_200));
    }
}
