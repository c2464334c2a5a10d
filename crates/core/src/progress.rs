//! Publish/subscribe fan-out of ingestion progress.
//!
//! Each subscriber owns an unbounded FIFO queue, so a slow listener never
//! loses log lines and never blocks the publisher. Dropping a
//! [`Subscription`] unsubscribes it.

use crate::IngestionEvent;
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::info;

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    senders: Mutex<HashMap<u64, UnboundedSender<IngestionEvent>>>,
}

#[derive(Clone, Default)]
pub struct ProgressChannel {
    inner: Arc<Subscribers>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded_channel();
        self.inner.senders.lock().insert(id, sender);
        Subscription {
            id,
            receiver,
            channel: Arc::clone(&self.inner),
            finished: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.senders.lock().len()
    }

    /// Publishes one log line. A trailing newline is added when missing.
    pub fn log(&self, message: impl Into<String>) {
        let mut line = message.into();
        info!(target: "ingestion", "{}", line.trim_end());
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.publish(IngestionEvent::Log(line));
    }

    pub fn done(&self) {
        self.publish(IngestionEvent::Done);
    }

    pub fn publish(&self, event: IngestionEvent) {
        self.inner
            .senders
            .lock()
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }
}

pub struct Subscription {
    id: u64,
    receiver: UnboundedReceiver<IngestionEvent>,
    channel: Arc<Subscribers>,
    finished: bool,
}

impl Subscription {
    /// Next event, or `None` once `Done` has been delivered.
    pub async fn recv(&mut self) -> Option<IngestionEvent> {
        if self.finished {
            return None;
        }
        let event = self.receiver.recv().await?;
        if event == IngestionEvent::Done {
            self.finished = true;
            self.unsubscribe();
        }
        Some(event)
    }

    pub fn unsubscribe(&self) {
        self.channel.senders.lock().remove(&self.id);
    }

    pub fn into_stream(self) -> impl Stream<Item = IngestionEvent> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            let event = subscription.recv().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Publishes `Done` when dropped, including during unwinding.
pub struct DoneGuard {
    channel: ProgressChannel,
}

impl DoneGuard {
    pub fn new(channel: ProgressChannel) -> Self {
        Self { channel }
    }
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.channel.done();
    }
}
