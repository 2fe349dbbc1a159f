//! Matchmaking service - connections, the waiting slot and match creation

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::game::r#match::MatchHandle;
use crate::game::{
    ConnId, GameMatch, InputState, MatchCommand, MatchRegistry, MatchSettings, PlayerIdentity,
    RatingLedger,
};
use crate::ws::protocol::ServerMsg;

use super::waiting::{Pairing, WaitingSlot};

/// Live transport connection
#[derive(Clone)]
pub struct Connection {
    pub outbound: mpsc::Sender<ServerMsg>,
    /// Set once `identify` succeeds
    pub identity: Option<PlayerIdentity>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FindMatchError {
    #[error("unknown connection")]
    UnknownConnection,
    #[error("connection is not identified")]
    NotIdentified,
    #[error("connection is already in a match")]
    AlreadyInMatch,
}

/// Matchmaking service
pub struct MatchmakingService {
    waiting: WaitingSlot,
    registry: Arc<MatchRegistry>,
    connections: DashMap<ConnId, Connection>,
    ledger: Arc<dyn RatingLedger>,
    settings: MatchSettings,
}

impl MatchmakingService {
    pub fn new(
        registry: Arc<MatchRegistry>,
        ledger: Arc<dyn RatingLedger>,
        settings: MatchSettings,
    ) -> Self {
        Self {
            waiting: WaitingSlot::new(),
            registry,
            connections: DashMap::new(),
            ledger,
            settings,
        }
    }

    /// Register a connection (called when the WebSocket opens)
    pub fn register_connection(&self, conn_id: ConnId, outbound: mpsc::Sender<ServerMsg>) {
        self.connections.insert(
            conn_id,
            Connection {
                outbound,
                identity: None,
            },
        );
    }

    /// Bind an account to a connection and confirm it to the client
    pub fn identify(&self, conn_id: ConnId, identity: PlayerIdentity) {
        let rating = identity.rating;
        let Some(mut connection) = self.connections.get_mut(&conn_id) else {
            return;
        };
        info!(conn_id = %conn_id, player_id = %identity.id, "Connection identified");
        connection.identity = Some(identity);
        drop(connection);

        self.send_to(conn_id, ServerMsg::Identified { rating });
    }

    /// Deliver a message to one connection without waiting
    pub fn send_to(&self, conn_id: ConnId, msg: ServerMsg) {
        let Some(outbound) = self.connections.get(&conn_id).map(|c| c.outbound.clone()) else {
            return;
        };
        match outbound.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = %conn_id, "Outbound queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %conn_id, "Outbound queue closed");
            }
        }
    }

    /// Pair with the waiting connection, or wait for the next one
    pub fn find_match(&self, conn_id: ConnId) -> Result<(), FindMatchError> {
        let identified = self
            .connections
            .get(&conn_id)
            .map(|c| c.identity.is_some())
            .ok_or(FindMatchError::UnknownConnection)?;

        if !identified {
            self.send_to(
                conn_id,
                ServerMsg::AuthError {
                    message: "Must be logged in to play online".to_string(),
                },
            );
            return Err(FindMatchError::NotIdentified);
        }

        if self.registry.match_for_connection(&conn_id).is_some() {
            return Err(FindMatchError::AlreadyInMatch);
        }

        match self.waiting.pair_or_park(conn_id) {
            Pairing::Parked | Pairing::AlreadyWaiting => {
                info!(conn_id = %conn_id, "Waiting for opponent");
                self.send_to(conn_id, ServerMsg::WaitingForOpponent);
            }
            Pairing::Paired(opponent) => {
                debug!(
                    conn_id = %conn_id,
                    opponent = %opponent.conn_id,
                    waited_ms = opponent.wait_time().as_millis() as u64,
                    "Paired with waiting player"
                );
                if !self.create_match(opponent.conn_id, conn_id) {
                    // Opponent vanished between parking and pairing
                    self.waiting.pair_or_park(conn_id);
                    self.send_to(conn_id, ServerMsg::WaitingForOpponent);
                }
            }
        }

        Ok(())
    }

    /// Start a match for two identified connections.
    /// Returns false if either connection is gone.
    fn create_match(&self, first: ConnId, second: ConnId) -> bool {
        let seat = |conn_id: ConnId| {
            let connection = self.connections.get(&conn_id)?;
            let identity = connection.identity.clone()?;
            Some((conn_id, identity, connection.outbound.clone()))
        };
        let (Some(a), Some(b)) = (seat(first), seat(second)) else {
            return false;
        };

        let match_id = Uuid::new_v4();
        let (mut game_match, handle) = GameMatch::new(
            match_id,
            rand::random::<u64>(),
            self.settings.clone(),
            self.ledger.clone(),
        );

        for (conn_id, identity, outbound) in [a, b] {
            if let Err(e) = game_match.add_player(conn_id, identity, outbound) {
                error!(match_id = %match_id, conn_id = %conn_id, error = %e, "Failed to seat player");
                return false;
            }
        }

        self.launch(game_match, handle, [first, second]);
        true
    }

    /// Register a seated match and start its loop
    fn launch(&self, game_match: GameMatch, handle: MatchHandle, seats: [ConnId; 2]) {
        let match_id = handle.id;
        self.registry.insert(handle, &seats);
        info!(match_id = %match_id, "Created new match");

        // A disconnect that ran between seating and registration found no
        // match to leave. Whoever detaches the index entry sends the leave.
        for conn_id in seats {
            if self.connections.contains_key(&conn_id) {
                continue;
            }
            if let Some(handle) = self.registry.detach_connection(&conn_id) {
                debug!(match_id = %match_id, conn_id = %conn_id, "Seated connection already gone");
                handle.send(MatchCommand::Leave { conn_id });
            }
        }

        let registry = self.registry.clone();
        tokio::spawn(async move {
            game_match.run().await;

            if registry.remove(&match_id).is_some() {
                info!(match_id = %match_id, "Match removed from registry");
            }
        });
    }

    /// Forward input to the match owning this connection
    pub fn route_input(&self, conn_id: ConnId, input: InputState) {
        match self.registry.match_for_connection(&conn_id) {
            Some(handle) => {
                handle.send(MatchCommand::Input { conn_id, input });
            }
            None => debug!(conn_id = %conn_id, "Input without a match dropped"),
        }
    }

    /// Connection lost: leave the waiting slot or forfeit the match
    pub fn disconnect(&self, conn_id: ConnId) {
        // Must precede the index lookup; `launch` relies on this order
        self.connections.remove(&conn_id);

        if self.waiting.remove(conn_id) {
            info!(conn_id = %conn_id, "Left waiting slot");
        }

        if let Some(handle) = self.registry.detach_connection(&conn_id) {
            handle.send(MatchCommand::Leave { conn_id });
        }
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
