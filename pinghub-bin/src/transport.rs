//! `Transport` implementation over a real `axum` WebSocket (§6).
//!
//! `axum::extract::ws::WebSocket` has no `SetReadDeadline`/`SetPongHandler`
//! pair the way `gorilla/websocket` does (`original_source/websocket.go`), so
//! deadlines are applied here with `tokio::time::timeout` around `next()`/
//! `send()`, and a peer pong surfaces as an ordinary `Message::Pong` item
//! instead of a callback.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use pinghub_core::{Frame, Transport, TransportError, TransportReader, TransportWriter};
use std::io;
use std::time::Duration;

pub struct AxumTransport(pub WebSocket);

pub struct AxumReader(SplitStream<WebSocket>);
pub struct AxumWriter(SplitSink<WebSocket, Message>);

impl Transport for AxumTransport {
    type Reader = AxumReader;
    type Writer = AxumWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.0.split();
        (AxumReader(stream), AxumWriter(sink))
    }
}

impl TransportReader for AxumReader {
    async fn recv(&mut self, deadline: Duration) -> Result<Option<Frame>, TransportError> {
        let next = tokio::time::timeout(deadline, self.0.next())
            .await
            .map_err(|_| TransportError::ReadTimeout)?;

        match next {
            None => Ok(None),
            Some(Err(err)) => Err(TransportError::Io(io::Error::new(io::ErrorKind::Other, err))),
            Some(Ok(Message::Text(text))) => Ok(Some(Frame::Text(Bytes::from(text.into_bytes())))),
            Some(Ok(Message::Binary(bytes))) => Ok(Some(Frame::Text(Bytes::from(bytes)))),
            Some(Ok(Message::Ping(_))) => Ok(Some(Frame::Ping)),
            Some(Ok(Message::Pong(_))) => Ok(Some(Frame::Pong)),
            Some(Ok(Message::Close(_))) => Ok(Some(Frame::Close)),
        }
    }
}

impl TransportWriter for AxumWriter {
    async fn send(&mut self, frame: Frame, deadline: Duration) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(payload) => match String::from_utf8(payload.to_vec()) {
                Ok(text) => Message::Text(text),
                Err(err) => Message::Binary(err.into_bytes()),
            },
            Frame::Ping => Message::Ping(Vec::new()),
            Frame::Pong => Message::Pong(Vec::new()),
            Frame::Close => Message::Close(Some(CloseFrame {
                code: 1000, // normal closure, RFC 6455 §7.4.1
                reason: std::borrow::Cow::Borrowed(""),
            })),
        };

        tokio::time::timeout(deadline, self.0.send(message))
            .await
            .map_err(|_| TransportError::WriteTimeout)?
            .map_err(|err| TransportError::Io(io::Error::new(io::ErrorKind::Other, err)))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}
