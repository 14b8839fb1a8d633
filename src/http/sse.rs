use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{stream, Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::pipeline::{JobEvent, PipelineEvent, PipelineOrchestrator, UploadProgress};

type BoxedEvents = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub type JobEventStream = Sse<BoxedEvents>;

fn event_name(event: &JobEvent) -> &'static str {
    match event.event {
        PipelineEvent::Progress(_) => "progress",
        PipelineEvent::Error(_) => "error",
        PipelineEvent::Complete(_) => "complete",
    }
}

fn job_event(event: JobEvent) -> Option<Result<Event, Infallible>> {
    let payload = serde_json::to_string(&event).ok()?;
    Some(Ok(Event::default()
        .event(event_name(&event))
        .id(event.generation.to_string())
        .data(payload)))
}

fn upload_event(progress: UploadProgress) -> Option<Result<Event, Infallible>> {
    let payload = serde_json::to_string(&progress).ok()?;
    Some(Ok(Event::default().event("upload").data(payload)))
}

/// Build a Server-Sent Events stream of job events.
///
/// Upload progress is interleaved as separate `upload` events. Lagged
/// receivers skip the missed events; the stream itself stays open.
pub fn job_events(orchestrator: &PipelineOrchestrator) -> JobEventStream {
    let jobs = BroadcastStream::new(orchestrator.subscribe())
        .filter_map(|result| async move { result.ok().and_then(job_event) });
    let uploads = BroadcastStream::new(orchestrator.subscribe_uploads())
        .filter_map(|result| async move { result.ok().and_then(upload_event) });

    let events: BoxedEvents = Box::pin(stream::select(jobs, uploads));
    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("birdcall-keepalive"),
    )
}
