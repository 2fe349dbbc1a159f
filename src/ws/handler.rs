//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::ConnId;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Capacity of a connection's outbound queue
const OUTBOUND_QUEUE: usize = 256;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id: ConnId = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_QUEUE);

    state.matchmaking.register_connection(conn_id, outbound_tx);

    let writer_handle = tokio::spawn(run_writer(conn_id, ws_sink, outbound_rx));

    run_reader(conn_id, ws_stream, &state).await;

    // Forfeits a running match or frees the waiting slot
    state.matchmaking.disconnect(conn_id);
    writer_handle.abort();

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Writer task: outbound queue -> WebSocket
async fn run_writer(
    conn_id: ConnId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Reader loop: WebSocket -> matchmaking / match
async fn run_reader(conn_id: ConnId, mut ws_stream: SplitStream<WebSocket>, state: &AppState) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    debug!(conn_id = %conn_id, "Rate limited message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => handle_client_msg(conn_id, msg, state).await,
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

async fn handle_client_msg(conn_id: ConnId, msg: ClientMsg, state: &AppState) {
    match msg {
        ClientMsg::Identify { id } => match state.profile_store.get_player(id).await {
            Ok(Some(record)) => state.matchmaking.identify(conn_id, record.identity()),
            // Unknown accounts are ignored
            Ok(None) => debug!(conn_id = %conn_id, player_id = %id, "Identify for unknown player"),
            Err(e) => {
                error!(conn_id = %conn_id, player_id = %id, error = %e, "Failed to fetch player");
            }
        },
        ClientMsg::FindMatch => {
            if let Err(e) = state.matchmaking.find_match(conn_id) {
                debug!(conn_id = %conn_id, error = %e, "findMatch rejected");
            }
        }
        ClientMsg::PlayerInput(input) => state.matchmaking.route_input(conn_id, input),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
