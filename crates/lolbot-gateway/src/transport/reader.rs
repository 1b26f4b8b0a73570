//! Reader task
//!
//! Blocks on the socket, bounded by the read timeout, and turns every frame
//! into a control message tagged with the connection that produced it.

use super::connection::WsSource;
use super::ConnectionId;
use crate::error::GatewayError;
use crate::pump::{ControlMessage, ControlSender};
use crate::protocol::GatewayMessage;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// A socket frame, classified
#[derive(Debug)]
pub(super) enum Frame {
    Message(GatewayMessage),
    /// Data frame whose payload is not a gateway message
    Undecodable(serde_json::Error),
    /// Ping, pong and raw frames
    Skip,
    Closed(GatewayError),
}

pub(super) fn decode_frame(next: Option<Result<Message, WsError>>) -> Frame {
    match next {
        Some(Ok(Message::Text(text))) => match GatewayMessage::from_json(&text) {
            Ok(message) => Frame::Message(message),
            Err(e) => Frame::Undecodable(e),
        },
        Some(Ok(Message::Binary(data))) => match serde_json::from_slice(&data) {
            Ok(message) => Frame::Message(message),
            Err(e) => Frame::Undecodable(e),
        },
        Some(Ok(Message::Close(Some(frame)))) => {
            Frame::Closed(GatewayError::closed(Some(u16::from(frame.code)), frame.reason.to_string()))
        }
        Some(Ok(Message::Close(None))) => {
            Frame::Closed(GatewayError::closed(None, "closed without status"))
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => Frame::Skip,
        Some(Err(e)) => Frame::Closed(GatewayError::closed(None, e.to_string())),
        None => Frame::Closed(GatewayError::closed(None, "stream ended")),
    }
}

pub(super) async fn read_loop(
    connection: ConnectionId,
    mut stream: WsSource,
    read_timeout: Duration,
    closed: Arc<AtomicBool>,
    control: ControlSender,
) {
    let error = loop {
        let next = match tokio::time::timeout(read_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => break GatewayError::Timeout(read_timeout),
        };

        match decode_frame(next) {
            Frame::Message(message) => {
                if closed.load(Ordering::SeqCst) {
                    continue;
                }
                tracing::trace!(connection = %connection, message = %message, "Frame received");
                let inbound = ControlMessage::Inbound {
                    connection,
                    message,
                };
                if control.send(inbound).is_err() {
                    return;
                }
            }
            Frame::Undecodable(e) => {
                tracing::warn!(connection = %connection, error = %e, "Skipping undecodable frame");
            }
            Frame::Skip => {}
            Frame::Closed(error) => break error,
        }
    };

    if closed.load(Ordering::SeqCst) {
        tracing::debug!(connection = %connection, "Reader finished after local close");
    } else {
        tracing::debug!(connection = %connection, error = %error, "Reader stopped");
        let _ = control.send(ControlMessage::TransportError { connection, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn test_text_frame_decoded() {
        let frame = decode_frame(Some(Ok(Message::Text(
            r#"{"op":0,"t":"MESSAGE_CREATE","s":3,"d":{}}"#.to_string(),
        ))));
        match frame {
            Frame::Message(message) => {
                assert_eq!(message.op, OpCode::Dispatch);
                assert_eq!(message.s, Some(3));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_undecodable() {
        let frame = decode_frame(Some(Ok(Message::Text("not json".to_string()))));
        assert!(matches!(frame, Frame::Undecodable(_)));

        let unknown_op = decode_frame(Some(Ok(Message::Text(r#"{"op":99}"#.to_string()))));
        assert!(matches!(unknown_op, Frame::Undecodable(_)));
    }

    #[test]
    fn test_close_frame_keeps_code() {
        let frame = decode_frame(Some(Ok(Message::Close(Some(CloseFrame {
            code: WsCloseCode::from(4004),
            reason: "Authentication failed".into(),
        })))));

        match frame {
            Frame::Closed(error) => {
                assert!(error.is_fatal());
                assert!(error.to_string().contains("Authentication failed"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_end_of_stream_is_closed() {
        assert!(matches!(decode_frame(None), Frame::Closed(_)));
        assert!(matches!(
            decode_frame(Some(Ok(Message::Ping(Vec::new())))),
            Frame::Skip
        ));
    }
}
