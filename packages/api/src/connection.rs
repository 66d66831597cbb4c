//! Adapts an upgraded WebSocket to the hub's connection traits.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hub::{Connection, ConnectionError, Frame, FrameReader, FrameWriter};

/// An upgraded WebSocket, one envelope per text message.
pub struct WsConnection {
    socket: WebSocket,
}

impl WsConnection {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Connection for WsConnection {
    type Writer = WsWriter;
    type Reader = WsReader;

    fn split(self) -> (Self::Writer, Self::Reader) {
        let (sink, stream) = self.socket.split();
        (WsWriter { sink }, WsReader { stream })
    }
}

pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl FrameWriter for WsWriter {
    async fn send(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        self.sink
            .send(to_message(frame))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.sink
            .close()
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}

pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

impl FrameReader for WsReader {
    async fn recv(&mut self) -> Option<Result<Frame, ConnectionError>> {
        match self.stream.next().await? {
            Ok(message) => Some(Ok(to_frame(message))),
            Err(e) => Some(Err(ConnectionError::Transport(e.to_string()))),
        }
    }
}

/// Envelopes are JSON, so they go out as text; anything else as binary.
fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Message(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => Message::Binary(Bytes::from(e.into_bytes())),
        },
        Frame::Ping => Message::Ping(Bytes::new()),
        Frame::Pong => Message::Pong(Bytes::new()),
        Frame::Close => Message::Close(None),
    }
}

fn to_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Message(Bytes::copy_from_slice(text.as_str().as_bytes())),
        Message::Binary(bytes) => Frame::Message(bytes),
        Message::Ping(_) => Frame::Ping,
        Message::Pong(_) => Frame::Pong,
        Message::Close(_) => Frame::Close,
    }
}
