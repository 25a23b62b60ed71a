//! Event bus coordinator.
//!
//! The subscriber set is owned by a single Tokio task. Every subscribe,
//! unsubscribe, publish and count request is funneled through one unbounded
//! command channel and processed in arrival order, so the set is never
//! mutated concurrently and needs no lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

use super::{BroadcastMessage, SubmissionSink};

/// Per-subscriber queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one subscription, unique across every bus in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId {
    bus: u64,
    seq: u64,
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bus, self.seq)
    }
}

enum Command {
    Subscribe {
        id: SubscriberId,
        queue: mpsc::Sender<BroadcastMessage>,
        closed: Arc<AtomicBool>,
    },
    Unsubscribe(SubscriberId),
    Publish(BroadcastMessage),
    Count(oneshot::Sender<usize>),
}

/// Receiving end of one subscriber's bounded queue.
///
/// Dropping a subscription unsubscribes it. Once closed, no further message
/// is observable through [`Subscription::recv`], even ones already queued.
pub struct Subscription {
    id: SubscriberId,
    queue: mpsc::Receiver<BroadcastMessage>,
    closed: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits for the next message. Returns `None` once the subscription is
    /// closed or the coordinator has stopped. Cancel safe.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        if self.is_closed() {
            return None;
        }
        let message = self.queue.recv().await?;
        (!self.is_closed()).then_some(message)
    }

    /// Takes a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<BroadcastMessage> {
        if self.is_closed() {
            return None;
        }
        let message = self.queue.try_recv().ok()?;
        (!self.is_closed()).then_some(message)
    }

    /// Marks the subscription closed and asks the coordinator to forget it.
    /// Returns false if it was already closed.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // The coordinator being gone means there is nothing left to remove.
        let _ = self.commands.send(Command::Unsubscribe(self.id));
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Cloneable handle to the bus coordinator.
///
/// None of the handle's operations wait on a subscriber: subscribe,
/// unsubscribe and publish only enqueue a command for the coordinator.
#[derive(Clone)]
pub struct EventBus {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    next_seq: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl EventBus {
    /// Spawns the coordinator on the current Tokio runtime. It stops once
    /// every handle and subscription has been dropped.
    pub fn spawn(queue_capacity: usize) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let id = NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(Coordinator::new(id).run(receiver));
        Self {
            id,
            commands,
            next_seq: Arc::new(AtomicU64::new(1)),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Registers a new bounded queue.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId {
            bus: self.id,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let closed = Arc::new(AtomicBool::new(false));

        let registered = self.commands.send(Command::Subscribe {
            id,
            queue: sender,
            closed: closed.clone(),
        });
        if registered.is_err() {
            warn!("Event bus {} has stopped; subscriber {} starts closed", self.id, id);
            closed.store(true, Ordering::Release);
        }

        Subscription {
            id,
            queue: receiver,
            closed,
            commands: self.commands.clone(),
        }
    }

    /// Removes a subscription. Idempotent, and a no-op for subscriptions
    /// that belong to another bus.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        if subscription.id.bus != self.id {
            debug!(
                "Ignoring unsubscribe of {} on event bus {}",
                subscription.id, self.id
            );
            return;
        }
        subscription.close();
    }

    /// Hands `message` to every current subscriber. Fire and forget.
    pub fn publish(&self, message: BroadcastMessage) {
        if self.commands.send(Command::Publish(message)).is_err() {
            warn!("Event bus {} has stopped; dropping message", self.id);
        }
    }

    /// Size of the subscriber set once every previously issued command has
    /// been applied.
    pub async fn subscriber_count(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Count(reply)).is_err() {
            return 0;
        }
        response.await.unwrap_or(0)
    }
}

impl SubmissionSink for EventBus {
    fn publish(&self, message: BroadcastMessage) {
        EventBus::publish(self, message);
    }
}

struct Subscriber {
    queue: mpsc::Sender<BroadcastMessage>,
    closed: Arc<AtomicBool>,
    delivered: u64,
    dropped: u64,
}

struct Coordinator {
    bus: u64,
    subscribers: HashMap<SubscriberId, Subscriber>,
}

impl Coordinator {
    fn new(bus: u64) -> Self {
        Self {
            bus,
            subscribers: HashMap::new(),
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("Event bus {} coordinator started", self.bus);
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        debug!("Event bus {} coordinator stopped", self.bus);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe { id, queue, closed } => {
                if closed.load(Ordering::Acquire) {
                    return;
                }
                self.subscribers.insert(
                    id,
                    Subscriber {
                        queue,
                        closed,
                        delivered: 0,
                        dropped: 0,
                    },
                );
                debug!(
                    "Subscriber {} joined ({} active)",
                    id,
                    self.subscribers.len()
                );
            }
            Command::Unsubscribe(id) => self.remove(id),
            Command::Publish(message) => self.fan_out(message),
            Command::Count(reply) => {
                let _ = reply.send(self.subscribers.len());
            }
        }
    }

    fn remove(&mut self, id: SubscriberId) {
        if let Some(subscriber) = self.subscribers.remove(&id) {
            subscriber.closed.store(true, Ordering::Release);
            debug!(
                "Subscriber {} left after {} delivered, {} dropped ({} active)",
                id,
                subscriber.delivered,
                subscriber.dropped,
                self.subscribers.len()
            );
        }
    }

    fn fan_out(&mut self, message: BroadcastMessage) {
        self.subscribers
            .retain(|id, subscriber| match subscriber.queue.try_send(message.clone()) {
                Ok(()) => {
                    subscriber.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    subscriber.dropped += 1;
                    debug!(
                        "Subscriber {} queue full; dropped lead {}",
                        id,
                        message.lead_id()
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    subscriber.closed.store(true, Ordering::Release);
                    debug!("Subscriber {} queue closed; removing", id);
                    false
                }
            });
    }
}
