//! Submission handlers: the streaming protocol over SSE and the synchronous
//! aggregate.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::ApiError;
use crate::pipeline::{ChannelSink, StageEnvelope};
use crate::schema::process::{ProcessRequest, ProcessResponse};
use crate::state::AppState;

/// Envelopes buffered between the pipeline and a slow client.
const STREAM_BUFFER: usize = 64;

/// Streams stage envelopes as server-sent events.
///
/// `POST /process/stream`
///
/// Each envelope becomes one event named after its stage, with the whole
/// envelope as JSON data. The pipeline runs in its own task; dropping the
/// response closes the channel, which the pipeline treats as cancellation.
pub async fn process_stream(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let submission = req.into_submission()?;
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        let sink = ChannelSink::new(tx);
        pipeline.run(submission, &sink).await;
    });

    let stream = ReceiverStream::new(rx).map(|envelope| {
        if envelope.stage.is_terminal() {
            tracing::debug!(stage = envelope.stage.as_str(), "stream finished");
        }
        Ok(envelope_event(&envelope))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn envelope_event(envelope: &StageEnvelope) -> Event {
    let event = Event::default().event(envelope.stage.as_str());
    match serde_json::to_string(envelope) {
        Ok(data) => event.data(data),
        Err(err) => {
            tracing::warn!("failed to encode {} envelope: {}", envelope.stage.as_str(), err);
            event.data(r#"{"stage":"error","payload":{"error":"envelope encoding failed"}}"#)
        }
    }
}

/// Runs every stage and returns the aggregate summary.
///
/// `POST /process`
pub async fn process(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let submission = req.into_submission()?;
    let result = state.pipeline.process(submission).await?;
    Ok(Json(ProcessResponse { ok: true, result }))
}
