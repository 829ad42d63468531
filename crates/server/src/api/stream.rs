//! Live decision stream.
//!
//! `GET /api/telemetry/stream` serves Server-Sent Events mirroring the
//! telemetry pipeline: `request` and `violation` events as decisions happen,
//! a named `heartbeat` event on an interval, and an `error` event when a
//! slow client lags behind the broadcast buffer (the stream then continues
//! from the latest event).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tracing::debug;

use warden_telemetry::TelemetryRecord;

use super::AppState;

/// Interval between named heartbeat events.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// `GET /api/telemetry/stream` -- subscribe to live enforcement decisions.
#[utoipa::path(
    get,
    path = "/api/telemetry/stream",
    tag = "Telemetry",
    summary = "Live decision stream",
    description = "Server-sent events: request, violation, heartbeat, and error.",
    responses(
        (status = 200, description = "SSE stream", content_type = "text/event-stream")
    )
)]
pub async fn stream(State(state): State<AppState>) -> impl IntoResponse {
    debug!("telemetry stream subscriber connected");
    Sse::new(event_stream(state)).keep_alive(KeepAlive::default())
}

fn event_stream(state: AppState) -> impl Stream<Item = Result<Event, Infallible>> {
    let records = BroadcastStream::new(state.telemetry.subscribe()).map(|result| {
        Ok::<_, Infallible>(match result {
            Ok(record) => record_event(&record),
            Err(BroadcastStreamRecvError::Lagged(missed)) => Event::default()
                .event("error")
                .data(format!("{{\"error\":\"lagged\",\"missed\":{missed}}}")),
        })
    });

    let heartbeats = IntervalStream::new(tokio::time::interval(HEARTBEAT_INTERVAL)).map(|_| {
        Ok(Event::default()
            .event("heartbeat")
            .data(format!("{{\"ts\":\"{}\"}}", chrono::Utc::now().to_rfc3339())))
    });

    records.merge(heartbeats)
}

fn record_event(record: &TelemetryRecord) -> Event {
    let data = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_owned());
    Event::default().event(record.event_name()).data(data)
}
