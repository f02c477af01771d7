use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;

use crate::api_state::ApiState;

/// `GET /stream` (§4.11 C11): forwards bus events as SSE messages typed
/// `node_added` / `edges_added` / `index_run_completed` / `dropped`.
pub async fn stream(State(state): State<ApiState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscriber = state.events.subscribe();
    let events = async_stream::stream! {
        while let Some(event) = subscriber.recv().await {
            let event_type = event.event_type();
            match serde_json::to_string(&event) {
                Ok(payload) => yield Ok(Event::default().event(event_type).data(payload)),
                Err(_) => continue,
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
