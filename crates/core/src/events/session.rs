//! Server-side state for one live streaming connection.

use std::time::Duration;

use futures::Stream;
use log::debug;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{BroadcastMessage, EventBus, Subscription};

/// Heartbeat interval used when none is configured.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Comment sent as the first frame so the client knows the stream is open.
pub const OPEN_COMMENT: &str = "connected";

/// Comment sent on every heartbeat tick.
pub const HEARTBEAT_COMMENT: &str = "heartbeat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Closed,
}

/// One unit of output for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFrame {
    /// Unnamed comment frame (open confirmation or heartbeat).
    Comment(&'static str),
    /// Named `submission` event carrying a serialized lead.
    Submission(BroadcastMessage),
}

enum Wake {
    Cancelled,
    Message(Option<BroadcastMessage>),
    Heartbeat,
}

/// `Connecting -> Connected -> Closed`.
///
/// The session subscribes on its first frame and unsubscribes exactly once
/// when it closes, whether that is through cancellation, the bus going away,
/// or the session simply being dropped by a transport that failed to write.
pub struct SubscriberSession {
    bus: EventBus,
    subscription: Option<Subscription>,
    heartbeat: Option<Interval>,
    heartbeat_every: Duration,
    cancel: CancellationToken,
    state: SessionState,
}

impl SubscriberSession {
    pub fn new(bus: EventBus, heartbeat_every: Duration, cancel: CancellationToken) -> Self {
        Self {
            bus,
            subscription: None,
            heartbeat: None,
            heartbeat_every: heartbeat_every.max(Duration::from_millis(1)),
            cancel,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Waits for whichever comes first: cancellation, a message, or a
    /// heartbeat tick. Returns `None` once the session is closed.
    pub async fn next_frame(&mut self) -> Option<SessionFrame> {
        match self.state {
            SessionState::Connecting => return Some(self.connect()),
            SessionState::Closed => return None,
            SessionState::Connected => {}
        }

        let wake = match (self.subscription.as_mut(), self.heartbeat.as_mut()) {
            (Some(subscription), Some(heartbeat)) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Cancelled,
                message = subscription.recv() => Wake::Message(message),
                _ = heartbeat.tick() => Wake::Heartbeat,
            },
            _ => Wake::Cancelled,
        };

        match wake {
            Wake::Message(Some(message)) => Some(SessionFrame::Submission(message)),
            Wake::Heartbeat => Some(SessionFrame::Comment(HEARTBEAT_COMMENT)),
            Wake::Message(None) | Wake::Cancelled => {
                self.close();
                None
            }
        }
    }

    /// Transitions to `Closed`. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(&subscription);
            debug!("Session for subscriber {} closed", subscription.id());
        }
        self.heartbeat = None;
        self.state = SessionState::Closed;
    }

    /// Adapts the session into a frame stream. Dropping the stream closes
    /// the session.
    pub fn into_stream(self) -> impl Stream<Item = SessionFrame> + Send + 'static {
        futures::stream::unfold(self, |mut session| async move {
            let frame = session.next_frame().await?;
            Some((frame, session))
        })
    }

    fn connect(&mut self) -> SessionFrame {
        let subscription = self.bus.subscribe();
        debug!("Session for subscriber {} connected", subscription.id());
        self.subscription = Some(subscription);

        let mut heartbeat = time::interval_at(
            Instant::now() + self.heartbeat_every,
            self.heartbeat_every,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(heartbeat);

        self.state = SessionState::Connected;
        SessionFrame::Comment(OPEN_COMMENT)
    }
}

impl Drop for SubscriberSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::Lead;
    use chrono::Utc;
    use futures::StreamExt;

    fn message(id: i64) -> BroadcastMessage {
        let lead = Lead {
            id,
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            message: "hi".to_string(),
            created_at: Utc::now().naive_utc(),
            client_submit_at: Some(1000),
            server_broadcast_at: None,
            submit_to_server_ms: None,
            server_to_display_ms: None,
            submit_to_display_ms: None,
            idempotency_key: None,
        };
        BroadcastMessage::from_lead(&lead, 2000).unwrap()
    }

    fn session(bus: &EventBus, cancel: &CancellationToken) -> SubscriberSession {
        SubscriberSession::new(bus.clone(), Duration::from_secs(30), cancel.clone())
    }

    #[tokio::test]
    async fn first_frame_is_open_comment_and_subscribes() {
        let bus = EventBus::spawn(8);
        let cancel = CancellationToken::new();
        let mut session = session(&bus, &cancel);
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(bus.subscriber_count().await, 0);

        assert_eq!(
            session.next_frame().await,
            Some(SessionFrame::Comment(OPEN_COMMENT))
        );
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(bus.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn forwards_published_messages() {
        let bus = EventBus::spawn(8);
        let cancel = CancellationToken::new();
        let mut session = session(&bus, &cancel);
        session.next_frame().await;

        bus.publish(message(1));

        assert_eq!(
            session.next_frame().await,
            Some(SessionFrame::Submission(message(1)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn emits_heartbeat_when_idle() {
        let bus = EventBus::spawn(8);
        let cancel = CancellationToken::new();
        let mut session = session(&bus, &cancel);
        session.next_frame().await;

        let started = Instant::now();
        assert_eq!(
            session.next_frame().await,
            Some(SessionFrame::Comment(HEARTBEAT_COMMENT))
        );
        assert!(started.elapsed() >= Duration::from_secs(30));

        assert_eq!(
            session.next_frame().await,
            Some(SessionFrame::Comment(HEARTBEAT_COMMENT))
        );
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn cancellation_closes_and_unsubscribes() {
        let bus = EventBus::spawn(8);
        let cancel = CancellationToken::new();
        let mut session = session(&bus, &cancel);
        session.next_frame().await;
        assert_eq!(bus.subscriber_count().await, 1);

        cancel.cancel();

        assert_eq!(session.next_frame().await, None);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.subscriber_count().await, 0);
        assert_eq!(session.next_frame().await, None);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let bus = EventBus::spawn(8);
        let cancel = CancellationToken::new();
        let mut session = session(&bus, &cancel);
        session.next_frame().await;
        let _other = bus.subscribe();

        session.close();
        session.close();
        drop(session);

        assert_eq!(bus.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn dropping_the_stream_unsubscribes() {
        let bus = EventBus::spawn(8);
        let cancel = CancellationToken::new();
        let before = bus.subscriber_count().await;

        let mut stream = Box::pin(session(&bus, &cancel).into_stream());
        assert_eq!(stream.next().await, Some(SessionFrame::Comment(OPEN_COMMENT)));
        assert_eq!(bus.subscriber_count().await, before + 1);

        drop(stream);
        assert_eq!(bus.subscriber_count().await, before);
    }

    #[tokio::test]
    async fn stream_ends_on_cancellation() {
        let bus = EventBus::spawn(8);
        let cancel = CancellationToken::new();
        let mut stream = Box::pin(session(&bus, &cancel).into_stream());
        stream.next().await;

        bus.publish(message(5));
        assert_eq!(
            stream.next().await,
            Some(SessionFrame::Submission(message(5)))
        );

        cancel.cancel();
        assert_eq!(stream.next().await, None);
        assert_eq!(bus.subscriber_count().await, 0);
    }
}
