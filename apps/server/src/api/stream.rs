use std::{convert::Infallible, sync::Arc};

use crate::main_lib::AppState;
use axum::{
    extract::State,
    response::sse::{Event as SseEvent, Sse},
    routing::get,
    Router,
};
use futures::{Stream, StreamExt};
use leadpulse_core::events::{SessionFrame, SubscriberSession};

fn to_sse(frame: SessionFrame) -> SseEvent {
    match frame {
        SessionFrame::Comment(text) => SseEvent::default().comment(text),
        SessionFrame::Submission(message) => SseEvent::default()
            .event(message.event_name())
            .data(message.data()),
    }
}

/// Live submissions. Heartbeats come from the session, so no axum keep-alive.
async fn stream_submissions(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let session = SubscriberSession::new(
        state.event_bus.clone(),
        state.heartbeat_interval,
        state.shutdown.child_token(),
    );
    let stream = session.into_stream().map(|frame| Ok(to_sse(frame)));
    Sse::new(stream)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/stream", get(stream_submissions))
}
