//! Match actor, handles and the process-wide match registry

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_duration, unix_millis};
use crate::ws::protocol::ServerMsg;

use super::entities::{ConnId, PlayerIdentity};
use super::rating::RatingLedger;
use super::simulation::{JoinError, LeaveOutcome, MatchEvent, MatchSettings, MatchState};
use super::snapshot::SnapshotBuilder;
use super::InputState;

/// Capacity of a match's command queue
const COMMAND_QUEUE: usize = 256;

/// Commands delivered to a running match
#[derive(Debug, Clone)]
pub enum MatchCommand {
    Input { conn_id: ConnId, input: InputState },
    Leave { conn_id: ConnId },
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    /// Bounded and lossy; input is resent by clients every frame
    command_tx: mpsc::Sender<MatchCommand>,
    /// Unbounded so a leave is never dropped
    leave_tx: mpsc::UnboundedSender<MatchCommand>,
    pub player_count: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Queue a command without waiting. Returns false if the match is gone,
    /// or if it is an input and the input queue is full.
    pub fn send(&self, command: MatchCommand) -> bool {
        match command {
            MatchCommand::Leave { .. } => self.leave_tx.send(command).is_ok(),
            MatchCommand::Input { .. } => match self.command_tx.try_send(command) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(match_id = %self.id, "Match input queue full, dropping input");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
        }
    }

    /// Stop the match loop without a game over
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Registry of all active matches, plus the connection -> match index
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
    by_connection: DashMap<ConnId, Uuid>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            by_connection: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle, connections: &[ConnId]) {
        for conn_id in connections {
            self.by_connection.insert(*conn_id, handle.id);
        }
        self.matches.insert(handle.id, handle);
    }

    /// Remove a match and every index entry pointing at it.
    /// Only the first call for a given id returns the handle.
    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        let removed = self.matches.remove(id).map(|(_, h)| h);
        if removed.is_some() {
            self.by_connection.retain(|_, match_id| match_id != id);
        }
        removed
    }

    pub fn match_for_connection(&self, conn_id: &ConnId) -> Option<MatchHandle> {
        let match_id = *self.by_connection.get(conn_id)?.value();
        self.get(&match_id)
    }

    /// Drop a connection from the index, returning the match it was in
    pub fn detach_connection(&self, conn_id: &ConnId) -> Option<MatchHandle> {
        let (_, match_id) = self.by_connection.remove(conn_id)?;
        self.get(&match_id)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().player_count())
            .sum()
    }

    /// Cancel every live match without a game over. Returns how many were
    /// signalled; each match deregisters itself once its loop stops.
    pub fn shutdown_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.matches.iter() {
            entry.value().shutdown();
            cancelled += 1;
        }
        cancelled
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match.
///
/// Owns its `MatchState` and is the only code that mutates it; input and
/// leave commands are applied between ticks inside the same task.
pub struct GameMatch {
    state: MatchState,
    command_rx: mpsc::Receiver<MatchCommand>,
    leave_rx: mpsc::UnboundedReceiver<MatchCommand>,
    outbound: HashMap<ConnId, mpsc::Sender<ServerMsg>>,
    ledger: Arc<dyn RatingLedger>,
    player_count: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

impl GameMatch {
    /// Create a new match
    pub fn new(
        id: Uuid,
        seed: u64,
        settings: MatchSettings,
        ledger: Arc<dyn RatingLedger>,
    ) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (leave_tx, leave_rx) = mpsc::unbounded_channel();
        let player_count = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(Notify::new());

        let handle = MatchHandle {
            id,
            command_tx,
            leave_tx,
            player_count: player_count.clone(),
            shutdown: shutdown.clone(),
        };

        let game_match = Self {
            state: MatchState::new(id, seed, settings),
            command_rx,
            leave_rx,
            outbound: HashMap::new(),
            ledger,
            player_count,
            shutdown,
        };

        (game_match, handle)
    }

    /// Seat a player before the loop runs. Filling the last seat starts the
    /// match and sends `matchFound` to everyone.
    pub fn add_player(
        &mut self,
        conn_id: ConnId,
        identity: PlayerIdentity,
        outbound: mpsc::Sender<ServerMsg>,
    ) -> Result<(), JoinError> {
        let now = unix_millis();
        let started = self.state.add_player(conn_id, identity, now)?;

        self.outbound.insert(conn_id, outbound);
        self.player_count
            .store(self.state.players.len(), Ordering::Relaxed);

        info!(
            match_id = %self.state.id,
            conn_id = %conn_id,
            player_count = self.state.players.len(),
            "Player joined match"
        );

        if started {
            self.broadcast(SnapshotBuilder::match_found(&self.state, now));
        }
        Ok(())
    }

    /// Run the authoritative tick loop until the match ends or is cancelled
    pub async fn run(mut self) {
        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    info!(match_id = %self.state.id, "Match cancelled");
                    break;
                }
                Some(leave) = self.leave_rx.recv() => {
                    if self.apply(leave) {
                        info!(match_id = %self.state.id, "All players left, closing match");
                        break;
                    }
                }
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if self.apply(command) {
                        info!(match_id = %self.state.id, "All players left, closing match");
                        break;
                    }
                }
                _ = tick_interval.tick() => {
                    let now = unix_millis();
                    self.state.tick(now);
                    self.flush_events(now);
                    if !self.state.is_over() {
                        self.broadcast(SnapshotBuilder::server_update(&self.state, now));
                    }
                }
            }

            if self.state.is_over() {
                break;
            }
        }

        self.player_count.store(0, Ordering::Relaxed);
        debug!(match_id = %self.state.id, "Match loop stopped");
    }

    /// Apply one command. Returns true when the match is now empty.
    fn apply(&mut self, command: MatchCommand) -> bool {
        let now = unix_millis();
        match command {
            MatchCommand::Input { conn_id, input } => {
                self.state.handle_input(conn_id, &input, now);
                false
            }
            MatchCommand::Leave { conn_id } => {
                // The leaver never hears about the outcome
                self.outbound.remove(&conn_id);
                let outcome = self.state.remove_player(conn_id);
                self.player_count
                    .store(self.outbound.len(), Ordering::Relaxed);

                info!(
                    match_id = %self.state.id,
                    conn_id = %conn_id,
                    outcome = ?outcome,
                    "Player left match"
                );

                self.flush_events(now);
                matches!(outcome, LeaveOutcome::Removed { now_empty: true })
            }
        }
    }

    fn flush_events(&mut self, now: u64) {
        for event in self.state.drain_events() {
            match event {
                MatchEvent::Explosion { x, y, range } => {
                    self.broadcast(ServerMsg::Explosion { x, y, range });
                }
                MatchEvent::GameOver(summary) => {
                    for change in summary.rating_changes.iter().filter(|c| c.delta != 0) {
                        self.ledger.adjust_rating(change.player_id, change.delta);
                    }
                    self.broadcast(SnapshotBuilder::game_over(&self.state, &summary, now));
                }
            }
        }
    }

    fn broadcast(&self, msg: ServerMsg) {
        for conn_id in self.outbound.keys() {
            self.send_to(conn_id, msg.clone());
        }
    }

    fn send_to(&self, conn_id: &ConnId, msg: ServerMsg) {
        let Some(tx) = self.outbound.get(conn_id) else {
            return;
        };
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(match_id = %self.state.id, conn_id = %conn_id, "Outbound queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(match_id = %self.state.id, conn_id = %conn_id, "Outbound queue closed");
            }
        }
    }
}
