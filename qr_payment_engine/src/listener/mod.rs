//! The notification listener.
//!
//! The listener owns one connection to the external push channel for the lifetime of a checkout screen. Inbound
//! frames are decoded into [`PaymentEvent`]s and forwarded to the reconciliation controller in arrival order.
//! Malformed frames are dropped with a logged warning and never affect connection health; transport failure is
//! surfaced as a distinct [`ListenerMessage::ChannelError`] so the screen can offer a reconnect, and no amount is
//! ever inferred from it.
//!
//! The connection itself is abstracted behind [`NotificationSource`] so the engine can sit on any bidirectional
//! message transport. [`TcpSource`] covers the line-delimited socket the mobile client uses; [`QueueSource`] and
//! [`StreamSource`] cover in-process wiring.
mod messages;

use futures_util::{Stream, StreamExt};
use log::*;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::{tcp::OwnedReadHalf, TcpStream, ToSocketAddrs},
    sync::mpsc,
};

pub use messages::{EventRejected, PaymentNotification};

use crate::db_types::{PaymentEvent, Reference};

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("The push channel transport failed: {0}")]
    Transport(String),
    #[error("The push channel closed unexpectedly")]
    Closed,
}

/// What the listener hands to the reconciliation controller.
#[derive(Debug, Clone)]
pub enum ListenerMessage {
    Event(PaymentEvent),
    ChannelError(ChannelError),
    Closed,
}

//--------------------------------------  NotificationSource  --------------------------------------------------------
/// One long-lived connection to the push channel, seen as a sequence of text frames.
///
/// `Ok(None)` signals an orderly end of the stream; transport faults are errors. Implementations do not need to
/// handle reconnection; the screen attaches a fresh listener (and source) when the user retries.
pub trait NotificationSource {
    fn next_frame(&mut self) -> impl std::future::Future<Output = Result<Option<String>, ChannelError>> + Send;
}

/// A line-delimited TCP transport. Each inbound line is one notification frame.
pub struct TcpSource {
    reader: BufReader<OwnedReadHalf>,
}

impl TcpSource {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| ChannelError::Transport(e.to_string()))?;
        let (read_half, _write_half) = stream.into_split();
        Ok(Self { reader: BufReader::new(read_half) })
    }
}

impl NotificationSource for TcpSource {
    async fn next_frame(&mut self) -> Result<Option<String>, ChannelError> {
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line).await {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    let frame = line.trim();
                    if !frame.is_empty() {
                        return Ok(Some(frame.to_string()));
                    }
                },
                Err(e) => return Err(ChannelError::Transport(e.to_string())),
            }
        }
    }
}

/// An in-process source backed by an mpsc queue. Dropping the sender ends the stream in an orderly fashion.
pub struct QueueSource {
    frames: mpsc::Receiver<String>,
}

pub fn queue_source(buffer: usize) -> (mpsc::Sender<String>, QueueSource) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, QueueSource { frames: rx })
}

impl NotificationSource for QueueSource {
    async fn next_frame(&mut self) -> Result<Option<String>, ChannelError> {
        Ok(self.frames.recv().await)
    }
}

/// Adapts any [`Stream`] of frame results into a source, for transports that already speak `futures`.
pub struct StreamSource<S> {
    inner: S,
}

impl<S> StreamSource<S>
where S: Stream<Item = Result<String, ChannelError>> + Unpin
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> NotificationSource for StreamSource<S>
where S: Stream<Item = Result<String, ChannelError>> + Unpin + Send
{
    async fn next_frame(&mut self) -> Result<Option<String>, ChannelError> {
        self.inner.next().await.transpose()
    }
}

//-------------------------------------- NotificationListener --------------------------------------------------------
/// Pumps one [`NotificationSource`] into the controller's message queue.
pub struct NotificationListener<S> {
    source: S,
    reference: Reference,
    forward: mpsc::Sender<ListenerMessage>,
}

impl<S: NotificationSource> NotificationListener<S> {
    pub fn new(source: S, reference: Reference, forward: mpsc::Sender<ListenerMessage>) -> Self {
        Self { source, reference, forward }
    }

    /// Run until the source ends, the transport fails, or the controller goes away.
    ///
    /// Decoded events are forwarded in arrival order. Frames that fail validation are dropped with a warning; they
    /// are a diagnostics concern, not a connection-health concern.
    pub async fn run(mut self) {
        debug!("📡 Listener for [{}] is up", self.reference);
        loop {
            match self.source.next_frame().await {
                Ok(Some(frame)) => {
                    let event = match PaymentNotification::decode(&frame)
                        .and_then(|n| n.into_event(&self.reference))
                    {
                        Ok(event) => event,
                        Err(rejection) => {
                            warn!("📡 Dropping notification frame for [{}]: {rejection}", self.reference);
                            continue;
                        },
                    };
                    trace!("📡 Forwarding {} from [{}]", event.amount, self.reference);
                    if self.forward.send(ListenerMessage::Event(event)).await.is_err() {
                        debug!("📡 Controller for [{}] is gone. Discarding further events.", self.reference);
                        return;
                    }
                },
                Ok(None) => {
                    debug!("📡 Push channel for [{}] closed", self.reference);
                    let _ = self.forward.send(ListenerMessage::Closed).await;
                    return;
                },
                Err(e) => {
                    warn!("📡 Push channel for [{}] failed: {e}", self.reference);
                    let _ = self.forward.send(ListenerMessage::ChannelError(e)).await;
                    return;
                },
            }
        }
    }
}

#[cfg(test)]
mod test {
    use futures_util::stream;
    use qpe_common::Cents;

    use super::*;

    #[tokio::test]
    async fn forwards_valid_frames_in_order_and_drops_rejects() {
        let frames = vec![
            Ok(r#"{"amount": 30000}"#.to_string()),
            Ok("garbage".to_string()),
            Ok(r#"{"amount": 0}"#.to_string()),
            Ok(r#"{"amount": 25000, "reference": "QR-1"}"#.to_string()),
        ];
        let source = StreamSource::new(stream::iter(frames));
        let (tx, mut rx) = mpsc::channel(8);
        let listener = NotificationListener::new(source, Reference::from("QR-1"), tx);
        listener.run().await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert!(matches!(first, ListenerMessage::Event(e) if e.amount == Cents::from(30_000)));
        assert!(matches!(second, ListenerMessage::Event(e) if e.amount == Cents::from(25_000)));
        assert!(matches!(third, ListenerMessage::Closed));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn surfaces_transport_failure() {
        let frames = vec![Err(ChannelError::Transport("connection reset".to_string()))];
        let source = StreamSource::new(stream::iter(frames));
        let (tx, mut rx) = mpsc::channel(8);
        NotificationListener::new(source, Reference::from("QR-1"), tx).run().await;
        assert!(matches!(rx.recv().await, Some(ListenerMessage::ChannelError(ChannelError::Transport(_)))));
    }

    #[tokio::test]
    async fn tcp_source_reads_line_delimited_frames() {
        use tokio::io::AsyncWriteExt;

        let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let writer = tokio::spawn(async move {
            let (mut socket, _) = server.accept().await.unwrap();
            // a blank line between frames must not produce an empty frame
            socket.write_all(b"{\"amount\": 30000}\n\n{\"amount\": 25000}\n").await.unwrap();
        });

        let mut source = TcpSource::connect(addr).await.unwrap();
        assert_eq!(source.next_frame().await.unwrap(), Some(r#"{"amount": 30000}"#.to_string()));
        assert_eq!(source.next_frame().await.unwrap(), Some(r#"{"amount": 25000}"#.to_string()));
        assert_eq!(source.next_frame().await.unwrap(), None);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn queue_source_ends_when_sender_drops() {
        let (tx, mut source) = queue_source(4);
        tx.send(r#"{"amount": 100}"#.to_string()).await.unwrap();
        drop(tx);
        assert_eq!(source.next_frame().await.unwrap(), Some(r#"{"amount": 100}"#.to_string()));
        assert_eq!(source.next_frame().await.unwrap(), None);
    }
}
