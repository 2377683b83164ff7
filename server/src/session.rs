use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    codec::{encode_reply, frame_text, CommandRequest, MALFORMED_REPLY},
    store::{CommandLogEntry, Datastore},
    AppState,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub ip: String,
    pub user_agent: String,
}

impl Peer {
    pub fn from_headers(headers: &HeaderMap, addr: SocketAddr) -> Self {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .unwrap_or("")
                .to_string()
        };
        let forwarded = header_str("x-forwarded-for");
        Self {
            ip: if forwarded.is_empty() { addr.to_string() } else { forwarded },
            user_agent: header_str(header::USER_AGENT.as_str()),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origin.allows(origin) {
        warn!(origin = origin.unwrap_or(""), remote = %addr, "rejected websocket upgrade");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let peer = Peer::from_headers(&headers, addr);
    ws.on_upgrade(move |socket| run_session(socket, state, peer))
}

/// Reads one frame, answers it, and repeats until the peer goes away. The
/// socket is dropped, and therefore closed, on every way out of the loop.
async fn run_session(mut socket: WebSocket, state: AppState, peer: Peer) {
    let span = info_span!("session", id = %Uuid::new_v4(), ip = %peer.ip);
    async move {
        info!(user_agent = %peer.user_agent, "session opened");
        while let Some(frame) = socket.recv().await {
            let msg = match frame {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "read failed");
                    break;
                }
            };
            let Some((kind, line)) = frame_text(&msg) else {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
                continue;
            };

            let reply = handle_line(&state, &peer, &line).await;
            if let Err(e) = socket.send(encode_reply(kind, reply)).await {
                warn!(error = %e, "write failed");
                break;
            }
        }
        info!("session closed");
    }
    .instrument(span)
    .await
}

pub(crate) async fn handle_line(state: &AppState, peer: &Peer, line: &str) -> String {
    let decoded = CommandRequest::decode(line);

    if state.audit {
        audit(Arc::clone(&state.store), audit_entry(decoded.as_ref().ok(), peer));
    }

    match decoded {
        Ok(req) => state.dispatcher.execute(&req).await,
        Err(e) => {
            debug!(error = %e, "malformed frame");
            MALFORMED_REPLY.to_string()
        }
    }
}

/// The log keeps the verb segment and flags frames sent from the `command`
/// directory. Malformed frames are logged as an empty, non-command entry.
fn audit_entry(req: Option<&CommandRequest>, peer: &Peer) -> CommandLogEntry {
    CommandLogEntry {
        raw: req.map(|r| r.verb.clone()).unwrap_or_default(),
        is_command: req.is_some_and(|r| r.directory == "command"),
        client_ip: peer.ip.clone(),
        user_agent: peer.user_agent.clone(),
    }
}

fn audit(store: Arc<dyn Datastore>, entry: CommandLogEntry) {
    tokio::spawn(
        async move {
            if let Err(e) = store.save_command(entry).await {
                warn!(error = %e, "failed to save command");
            }
        }
        .in_current_span(),
    );
}
