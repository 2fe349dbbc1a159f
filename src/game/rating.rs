//! Rating adjustment at match end (Elo) and on forfeit

use uuid::Uuid;

/// Elo K-factor
pub const K_FACTOR: f64 = 32.0;
/// Rating scale of the logistic curve
pub const RATING_SCALE: f64 = 400.0;
/// Applied to a player who disconnects from a running match
pub const FORFEIT_PENALTY: i32 = -30;
/// Applied to the player left standing after a forfeit
pub const FORFEIT_REWARD: i32 = 15;

/// Result of a finished two-player match, from the first player's view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    FirstWins,
    SecondWins,
    Draw,
}

impl Outcome {
    /// Strictly higher remaining health wins; equal health is a draw
    pub fn from_health(first: f32, second: f32) -> Self {
        if first > second {
            Outcome::FirstWins
        } else if second > first {
            Outcome::SecondWins
        } else {
            Outcome::Draw
        }
    }
}

/// Persistence seam for rating changes.
///
/// Implementations dispatch the update and return immediately; failures are
/// never reported back to the caller.
pub trait RatingLedger: Send + Sync {
    fn adjust_rating(&self, player_id: Uuid, delta: i32);
}

/// Rating math
pub struct RatingAdjuster;

impl RatingAdjuster {
    /// Expected score of `rating` against `opponent`
    pub fn expected_score(rating: i32, opponent: i32) -> f64 {
        1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / RATING_SCALE))
    }

    /// Rating deltas for (first, second). A draw changes nothing.
    pub fn elo_deltas(first: i32, second: i32, outcome: Outcome) -> (i32, i32) {
        let (s1, s2) = match outcome {
            Outcome::FirstWins => (1.0, 0.0),
            Outcome::SecondWins => (0.0, 1.0),
            Outcome::Draw => return (0, 0),
        };

        let e1 = Self::expected_score(first, second);
        let e2 = Self::expected_score(second, first);

        let d1 = (K_FACTOR * (s1 - e1)).round() as i32;
        let d2 = (K_FACTOR * (s2 - e2)).round() as i32;
        (d1, d2)
    }

    /// Deltas for (quitter, remaining player)
    pub fn forfeit_deltas() -> (i32, i32) {
        (FORFEIT_PENALTY, FORFEIT_REWARD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_swing_sixteen() {
        assert_eq!(RatingAdjuster::elo_deltas(500, 500, Outcome::FirstWins), (16, -16));
        assert_eq!(RatingAdjuster::elo_deltas(500, 500, Outcome::SecondWins), (-16, 16));
    }

    #[test]
    fn draw_changes_nothing() {
        assert_eq!(RatingAdjuster::elo_deltas(500, 900, Outcome::Draw), (0, 0));
        assert_eq!(Outcome::from_health(40.0, 40.0), Outcome::Draw);
    }

    #[test]
    fn underdog_win_pays_more() {
        let (underdog, favourite) = RatingAdjuster::elo_deltas(400, 600, Outcome::FirstWins);
        assert_eq!(underdog, 24);
        assert_eq!(favourite, -24);

        let (favourite, underdog) = RatingAdjuster::elo_deltas(600, 400, Outcome::FirstWins);
        assert_eq!(favourite, 8);
        assert_eq!(underdog, -8);
    }

    #[test]
    fn winner_by_health() {
        assert_eq!(Outcome::from_health(30.0, 0.0), Outcome::FirstWins);
        assert_eq!(Outcome::from_health(0.0, 12.5), Outcome::SecondWins);
    }

    #[test]
    fn forfeit_is_asymmetric() {
        assert_eq!(RatingAdjuster::forfeit_deltas(), (-30, 15));
    }
}
