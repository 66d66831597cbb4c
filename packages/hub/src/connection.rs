//! Duplex connection abstraction.
//!
//! The hub never performs handshakes or framing itself. A transport hands it
//! a [`Connection`] that already moves discrete frames in both directions;
//! the hub splits it so that a session's drain loop owns the writing half
//! and its read loop owns the reading half.

use std::future::Future;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ConnectionError;

/// A discrete unit moved across a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An encoded envelope.
    Message(Bytes),
    /// Heartbeat ping.
    Ping,
    /// Liveness response to a ping.
    Pong,
    /// Orderly shutdown notice.
    Close,
}

/// Writing half of a connection.
pub trait FrameWriter: Send + 'static {
    /// Write one frame.
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Close the underlying stream.
    fn close(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}

/// Reading half of a connection.
pub trait FrameReader: Send + 'static {
    /// Read the next frame, or `None` once the peer has gone away.
    fn recv(&mut self) -> impl Future<Output = Option<Result<Frame, ConnectionError>>> + Send;
}

/// An established duplex connection supplied by a transport.
pub trait Connection: Send + 'static {
    type Writer: FrameWriter;
    type Reader: FrameReader;

    /// Split into independently owned halves.
    fn split(self) -> (Self::Writer, Self::Reader);
}

/// In-process connection backed by channels.
///
/// The hub side is a [`MemoryConnection`]; the other end is a
/// [`MemoryPeer`] that plays the remote client.
pub fn memory_pair() -> (MemoryConnection, MemoryPeer) {
    let (to_peer, from_hub) = mpsc::unbounded_channel();
    let (to_hub, from_peer) = mpsc::unbounded_channel();
    (
        MemoryConnection { to_peer, from_peer },
        MemoryPeer {
            to_hub: Some(to_hub),
            from_hub,
        },
    )
}

/// Hub side of an in-process connection.
#[derive(Debug)]
pub struct MemoryConnection {
    to_peer: mpsc::UnboundedSender<Frame>,
    from_peer: mpsc::UnboundedReceiver<Frame>,
}

impl Connection for MemoryConnection {
    type Writer = MemoryWriter;
    type Reader = MemoryReader;

    fn split(self) -> (Self::Writer, Self::Reader) {
        (
            MemoryWriter {
                tx: Some(self.to_peer),
            },
            MemoryReader {
                rx: self.from_peer,
            },
        )
    }
}

#[derive(Debug)]
pub struct MemoryWriter {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        let tx = self.tx.as_ref().ok_or(ConnectionError::Closed)?;
        tx.send(frame).map_err(|_| ConnectionError::Closed)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.tx = None;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Option<Result<Frame, ConnectionError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Remote end of an in-process connection.
#[derive(Debug)]
pub struct MemoryPeer {
    to_hub: Option<mpsc::UnboundedSender<Frame>>,
    from_hub: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Send a frame to the hub.
    pub fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        let tx = self.to_hub.as_ref().ok_or(ConnectionError::Closed)?;
        tx.send(frame).map_err(|_| ConnectionError::Closed)
    }

    /// Send a JSON message to the hub.
    pub fn send_json(&self, message: &Value) -> Result<(), ConnectionError> {
        let bytes = serde_json::to_vec(message)
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        self.send(Frame::Message(Bytes::from(bytes)))
    }

    /// Receive the next frame written by the hub.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_hub.recv().await
    }

    /// Receive the next decoded message, skipping heartbeat pings.
    ///
    /// Returns `None` once the hub has closed the connection.
    pub async fn next_message(&mut self) -> Option<Value> {
        loop {
            match self.from_hub.recv().await? {
                Frame::Message(bytes) => return serde_json::from_slice(&bytes).ok(),
                Frame::Close => return None,
                Frame::Ping | Frame::Pong => continue,
            }
        }
    }

    /// Take a message that is already buffered, without waiting.
    pub fn try_next_message(&mut self) -> Option<Value> {
        while let Ok(frame) = self.from_hub.try_recv() {
            if let Frame::Message(bytes) = frame {
                return serde_json::from_slice(&bytes).ok();
            }
        }
        None
    }

    /// Hang up; the hub observes end-of-stream on its read half.
    pub fn close(&mut self) {
        self.to_hub = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_round_trip() {
        let (conn, mut peer) = memory_pair();
        let (mut writer, mut reader) = conn.split();

        writer.send(Frame::Message(Bytes::from_static(b"{\"type\":\"welcome\"}"))).await.unwrap();
        let message = peer.next_message().await.unwrap();
        assert_eq!(message["type"], "welcome");

        peer.send(Frame::Pong).unwrap();
        assert_eq!(reader.recv().await, Some(Ok(Frame::Pong)));
    }

    #[tokio::test]
    async fn test_peer_close_ends_reader() {
        let (conn, mut peer) = memory_pair();
        let (_writer, mut reader) = conn.split();

        peer.close();
        assert_eq!(reader.recv().await, None);
        assert_eq!(peer.send(Frame::Pong), Err(ConnectionError::Closed));
    }

    #[tokio::test]
    async fn test_writer_fails_after_peer_dropped() {
        let (conn, peer) = memory_pair();
        let (mut writer, _reader) = conn.split();

        drop(peer);
        assert_eq!(writer.send(Frame::Ping).await, Err(ConnectionError::Closed));
    }
}
