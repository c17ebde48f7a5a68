//! WebSocket upgrade for `GET /subscribe/{room_id}`
//!
//! The route is checked inside the handshake callback so bad paths get a
//! plain HTTP status (404 unknown route, 400 malformed room id). Room
//! existence needs an async lookup, so it is checked right after the upgrade
//! and an unknown room is closed with `1008 Policy Violation`.

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::WebSocketStream;

use super::config::ServerConfig;
use super::directory::RoomDirectory;
use crate::error::{Error, Result};
use crate::registry::RoomId;

/// Path prefix of the subscribe route
pub const SUBSCRIBE_PREFIX: &str = "/subscribe/";

/// Why a request path was refused before the upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathRejection {
    #[error("no such route")]
    NotFound,
    #[error("room id is not a valid UUID")]
    InvalidRoomId,
}

impl PathRejection {
    /// HTTP status sent to the client
    pub fn status(&self) -> StatusCode {
        match self {
            PathRejection::NotFound => StatusCode::NOT_FOUND,
            PathRejection::InvalidRoomId => StatusCode::BAD_REQUEST,
        }
    }
}

/// Extract the room id from a request path
///
/// The id must be a UUID. It is kept exactly as sent, since events are
/// addressed with the same raw id the REST routes use.
pub fn parse_subscribe_path(path: &str) -> std::result::Result<RoomId, PathRejection> {
    let raw = path
        .strip_prefix(SUBSCRIBE_PREFIX)
        .ok_or(PathRejection::NotFound)?;

    if raw.is_empty() || raw.contains('/') {
        return Err(PathRejection::NotFound);
    }

    uuid::Uuid::parse_str(raw).map_err(|_| PathRejection::InvalidRoomId)?;
    Ok(RoomId::new(raw))
}

fn websocket_config(config: &ServerConfig) -> WebSocketConfig {
    let mut ws = WebSocketConfig::default();
    ws.max_message_size = Some(config.max_message_size);
    ws.max_frame_size = Some(config.max_message_size);
    ws
}

fn rejection_response(reason: PathRejection) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = reason.status();
    response
}

/// Run the upgrade and resolve the room the client asked for
pub(crate) async fn accept<S, D>(
    stream: S,
    config: &ServerConfig,
    directory: &D,
) -> Result<(WebSocketStream<S>, RoomId)>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: RoomDirectory,
{
    let mut room: Option<RoomId> = None;
    let mut requested = String::new();
    let mut rejected: Option<(String, PathRejection)> = None;

    let callback = |request: &Request, response: Response| {
        let path = request.uri().path();
        requested = path.to_string();
        match parse_subscribe_path(path) {
            Ok(id) => {
                room = Some(id);
                Ok(response)
            }
            Err(reason) => {
                rejected = Some((path.to_string(), reason));
                Err(rejection_response(reason))
            }
        }
    };

    let handshake =
        tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(websocket_config(config)));
    let upgraded = time::timeout(config.handshake_timeout, handshake)
        .await
        .map_err(|_| Error::HandshakeTimeout(config.handshake_timeout))?;

    let mut ws = match upgraded {
        Ok(ws) => ws,
        Err(e) => {
            return Err(match rejected {
                Some((path, reason)) => Error::Rejected { path, reason },
                None => Error::Handshake(e),
            })
        }
    };

    // Only reachable if the handshake succeeds without consulting the callback
    let Some(room) = room else {
        return Err(Error::Rejected {
            path: requested,
            reason: PathRejection::NotFound,
        });
    };

    if !directory.room_exists(&room).await {
        refuse(&mut ws, config).await;
        return Err(Error::RoomNotFound(room));
    }

    Ok((ws, room))
}

/// Close an upgraded socket for a room that does not exist
async fn refuse<S>(ws: &mut WebSocketStream<S>, config: &ServerConfig)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Policy,
        reason: Utf8Bytes::from_static("room not found"),
    };
    if time::timeout(config.write_timeout, ws.close(Some(frame)))
        .await
        .is_err()
    {
        return;
    }

    // Wait for the peer's close reply, one write_timeout in total
    let reply = async {
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    };
    if time::timeout(config.write_timeout, reply).await.is_err() {
        tracing::debug!("Peer did not answer the close");
    }
}
