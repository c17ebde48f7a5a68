//! Inbound read loop
//!
//! Drains the read side so the connection never looks idle to the peer or to
//! intermediaries. Every frame refreshes the read deadline; client pings get a
//! pong; everything else is currently dropped.

use std::io::ErrorKind;

use futures::{Stream, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite::{error::ProtocolError, protocol::CloseFrame, Error, Message};

use super::cancel::CancelSignal;
use super::frame::{self, ClientFrame};
use super::handle::ConnectionHandle;
use super::keepalive::{KeepAlivePolicy, ReadDeadline};
use super::state::CloseReason;
use crate::stats::ConnectionCounters;

/// Read frames until cancellation, close, error or idle timeout
pub(crate) async fn run<S>(
    mut stream: S,
    handle: &ConnectionHandle,
    cancel: &CancelSignal,
    policy: KeepAlivePolicy,
    counters: &ConnectionCounters,
) -> CloseReason
where
    S: Stream<Item = Result<Message, Error>> + Unpin,
{
    let mut deadline = ReadDeadline::new(policy.idle_timeout);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CloseReason::Cancelled,
            next = time::timeout_at(deadline.instant(), stream.next()) => next,
        };

        let message = match next {
            Err(_) => return CloseReason::IdleTimeout,
            Ok(None) => return CloseReason::PeerClosed { code: None },
            Ok(Some(Err(e))) => return classify_error(e),
            Ok(Some(Ok(message))) => message,
        };

        deadline.refresh();
        counters.frame_received();

        match message {
            Message::Text(text) => {
                if let Some(ClientFrame::ClientPing) = ClientFrame::parse(&text) {
                    counters.client_ping();
                    tracing::debug!(connection_id = %handle.id(), "Received client ping");
                    if let Err(e) = handle.try_send(frame::server_pong()) {
                        return CloseReason::ReplyFailed(e);
                    }
                }
                // Other text frames are ignored for now
            }
            Message::Close(close) => return close_reason(close),
            Message::Ping(_) | Message::Pong(_) => {
                tracing::trace!(connection_id = %handle.id(), "Transport ping/pong");
            }
            Message::Binary(_) | Message::Frame(_) => {}
        }
    }
}

fn close_reason(close: Option<CloseFrame>) -> CloseReason {
    CloseReason::PeerClosed {
        code: close.map(|frame| u16::from(frame.code)),
    }
}

/// Split read errors into ordinary disconnects and real protocol failures
fn classify_error(error: Error) -> CloseReason {
    match error {
        Error::ConnectionClosed
        | Error::AlreadyClosed
        | Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            CloseReason::ConnectionLost
        }
        Error::Io(ref e)
            if matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ) =>
        {
            CloseReason::ConnectionLost
        }
        other => CloseReason::ProtocolError(other.to_string()),
    }
}
