//! Arena geometry, movement constraints and collision primitives

use super::entities::Obstacle;

/// Arena width in pixels
pub const ARENA_WIDTH: f32 = 1600.0;
/// Arena height in pixels
pub const ARENA_HEIGHT: f32 = 800.0;
/// Actors are kept this far from the arena edge
pub const WALL_MARGIN: f32 = 30.0;
/// Collision radius of players and the bot
pub const ACTOR_RADIUS: f32 = 20.0;
/// Step taken toward the arena center when an obstacle push would leave the arena
pub const CENTER_NUDGE_STEP: f32 = 2.0;

/// Physics system for actor movement and collision resolution
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Euclidean distance between two points
    pub fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
        let dx = x2 - x1;
        let dy = y2 - y1;
        (dx * dx + dy * dy).sqrt()
    }

    /// Unit vector for (dx, dy), or zero when the input is degenerate
    pub fn normalize(dx: f32, dy: f32) -> (f32, f32) {
        let len = (dx * dx + dy * dy).sqrt();
        if len < 0.0001 {
            (0.0, 0.0)
        } else {
            (dx / len, dy / len)
        }
    }

    /// Clamp a position to the playable area (arena minus wall margin)
    pub fn clamp_to_arena(x: f32, y: f32) -> (f32, f32) {
        (
            x.clamp(WALL_MARGIN, ARENA_WIDTH - WALL_MARGIN),
            y.clamp(WALL_MARGIN, ARENA_HEIGHT - WALL_MARGIN),
        )
    }

    /// Whether a position lies inside the playable area
    pub fn in_arena(x: f32, y: f32) -> bool {
        (WALL_MARGIN..=ARENA_WIDTH - WALL_MARGIN).contains(&x)
            && (WALL_MARGIN..=ARENA_HEIGHT - WALL_MARGIN).contains(&y)
    }

    /// Circle (treated as its bounding box) vs obstacle rectangle
    pub fn circle_hits_rect(cx: f32, cy: f32, radius: f32, obstacle: &Obstacle) -> bool {
        cx + radius > obstacle.left()
            && cx - radius < obstacle.right()
            && cy + radius > obstacle.top()
            && cy - radius < obstacle.bottom()
    }

    /// Distance from a point to the closest point of an obstacle rectangle.
    /// Returns (distance, closest_x, closest_y); distance is zero inside.
    pub fn distance_to_rect(x: f32, y: f32, obstacle: &Obstacle) -> (f32, f32, f32) {
        let cx = x.clamp(obstacle.left(), obstacle.right());
        let cy = y.clamp(obstacle.top(), obstacle.bottom());
        (Self::distance(x, y, cx, cy), cx, cy)
    }

    /// Elastic push that separates two actors by their interpenetration depth
    /// Returns ((new_x1, new_y1), (new_x2, new_y2))
    pub fn resolve_actor_collision(
        x1: f32, y1: f32, radius1: f32,
        x2: f32, y2: f32, radius2: f32,
    ) -> ((f32, f32), (f32, f32)) {
        let dx = x2 - x1;
        let dy = y2 - y1;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist < 0.001 {
            // Stacked exactly, push apart horizontally
            return ((x1 - radius1, y1), (x2 + radius2, y2));
        }

        let combined_radius = radius1 + radius2;
        let overlap = combined_radius - dist;

        if overlap <= 0.0 {
            return ((x1, y1), (x2, y2));
        }

        let nx = dx / dist;
        let ny = dy / dist;

        // Each side takes half the overlap
        let push = overlap / 2.0 + 0.1;

        (
            (x1 - nx * push, y1 - ny * push),
            (x2 + nx * push, y2 + ny * push),
        )
    }

    /// Best-effort penetration resolver against obstacle rectangles.
    ///
    /// For every obstacle the actor overlaps, the smallest of the four edge
    /// pushes is applied. If that push would leave the arena the actor is
    /// nudged toward the arena center instead. Zero interpenetration is not
    /// guaranteed; the goal is that actors never stay stuck.
    pub fn resolve_entity_obstacles(
        mut x: f32,
        mut y: f32,
        radius: f32,
        obstacles: &[Obstacle],
    ) -> (f32, f32) {
        for obstacle in obstacles {
            if !Self::circle_hits_rect(x, y, radius, obstacle) {
                continue;
            }

            let push_left = obstacle.left() - radius - x;
            let push_right = obstacle.right() + radius - x;
            let push_up = obstacle.top() - radius - y;
            let push_down = obstacle.bottom() + radius - y;

            let candidates = [
                (push_left, 0.0),
                (push_right, 0.0),
                (0.0, push_up),
                (0.0, push_down),
            ];
            let (px, py) = candidates
                .into_iter()
                .min_by(|a, b| {
                    let ma = a.0.abs() + a.1.abs();
                    let mb = b.0.abs() + b.1.abs();
                    ma.total_cmp(&mb)
                })
                .unwrap_or((0.0, 0.0));

            if Self::in_arena(x + px, y + py) {
                x += px;
                y += py;
            } else {
                let (nx, ny) =
                    Self::normalize(ARENA_WIDTH / 2.0 - x, ARENA_HEIGHT / 2.0 - y);
                x += nx * CENTER_NUDGE_STEP;
                y += ny * CENTER_NUDGE_STEP;
            }
        }

        (x, y)
    }
}
