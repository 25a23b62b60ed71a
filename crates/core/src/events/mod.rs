//! Real-time fan-out of new leads.
//!
//! A lead is published once it has been committed to storage. The
//! [`Publisher`] snapshots it into an immutable [`BroadcastMessage`], the
//! [`EventBus`] coordinator hands that message to every live
//! [`Subscription`], and each [`SubscriberSession`] turns its subscription
//! into a stream of frames for one streaming connection.
//!
//! ```text
//! LeadService ──► Publisher ──► EventBus (one coordinator task)
//!                                  │ try_send per subscriber
//!                     ┌────────────┼────────────┐
//!                     ▼            ▼            ▼
//!               SubscriberSession  ...   SubscriberSession ──► SSE
//! ```

mod bus;
mod message;
mod publisher;
mod session;
mod sink;

pub use bus::{EventBus, SubscriberId, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use message::BroadcastMessage;
pub use publisher::{now_millis, Publisher};
pub use session::{
    SessionFrame, SessionState, SubscriberSession, DEFAULT_HEARTBEAT_INTERVAL,
    HEARTBEAT_COMMENT, OPEN_COMMENT,
};
pub use sink::{MockSubmissionSink, SubmissionSink};
