//! Single waiting slot for players looking for an opponent

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::game::ConnId;

/// Connection parked in the waiting slot
#[derive(Debug, Clone, Copy)]
pub struct WaitingPlayer {
    pub conn_id: ConnId,
    pub queued_at: Instant,
}

impl WaitingPlayer {
    fn new(conn_id: ConnId) -> Self {
        Self {
            conn_id,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Result of offering a connection to the slot
#[derive(Debug, Clone, Copy)]
pub enum Pairing {
    /// The slot was empty; the connection now waits in it
    Parked,
    /// The connection was already the one waiting
    AlreadyWaiting,
    /// Someone else was waiting; the slot is now empty
    Paired(WaitingPlayer),
}

/// Holds at most one pending connection
#[derive(Default)]
pub struct WaitingSlot {
    slot: Mutex<Option<WaitingPlayer>>,
}

impl WaitingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair with whoever is waiting, or take the slot
    pub fn pair_or_park(&self, conn_id: ConnId) -> Pairing {
        let mut slot = self.slot.lock();
        match *slot {
            Some(waiting) if waiting.conn_id == conn_id => Pairing::AlreadyWaiting,
            Some(waiting) => {
                *slot = None;
                Pairing::Paired(waiting)
            }
            None => {
                *slot = Some(WaitingPlayer::new(conn_id));
                Pairing::Parked
            }
        }
    }

    /// Clear the slot if `conn_id` holds it
    pub fn remove(&self, conn_id: ConnId) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some_and(|w| w.conn_id == conn_id) {
            *slot = None;
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        usize::from(self.slot.lock().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn second_connection_pairs_with_the_first() {
        let slot = WaitingSlot::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(matches!(slot.pair_or_park(a), Pairing::Parked));
        assert!(matches!(slot.pair_or_park(a), Pairing::AlreadyWaiting));
        assert_eq!(slot.len(), 1);

        match slot.pair_or_park(b) {
            Pairing::Paired(waiting) => assert_eq!(waiting.conn_id, a),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(slot.len(), 0);
    }

    #[test]
    fn remove_only_clears_own_entry() {
        let slot = WaitingSlot::new();
        let a = Uuid::new_v4();
        slot.pair_or_park(a);

        assert!(!slot.remove(Uuid::new_v4()));
        assert_eq!(slot.len(), 1);
        assert!(slot.remove(a));
        assert_eq!(slot.len(), 0);
    }
}
