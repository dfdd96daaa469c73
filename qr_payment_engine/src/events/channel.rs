//! Simple stateless pub-sub event plumbing.
//!
//! Screen-level code can subscribe to engine events (intent satisfied, order finalized) and react to them without
//! access to the engine's internal state. Handlers receive the event itself and nothing more, and may be async.
//! Events are handled one at a time, in the order they were published.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until the last subscriber is dropped.
    pub async fn start_handler(mut self) {
        debug!("📬 Starting event handler");
        // drop the internal sender so the handler shuts down when the last subscriber goes away
        drop(self.sender);
        while let Some(event) = self.listener.recv().await {
            trace!("📬 Handling event");
            (self.handler)(event).await;
        }
        debug!("📬 Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬 Failed to send event: {e}");
        }
    }
}
