// crates/server/src/routes/job.rs
//! `GET /job/{id}` and `GET /job/{id}/stream` — snapshot and live-stream
//! views of a background job (§6, §4.7 "Event delivery"). The SSE route
//! follows `claude-view-server::routes::live`'s
//! `async-stream::stream!` + `axum::response::sse::{Sse, Event}` pattern,
//! replaying history before switching to the live channel (§4.7 Open
//! Question decision, S6: "subscriber receives the full historical event
//! prefix, then the channel closes promptly").

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use tokio_stream::Stream;
use uuid::Uuid;

use scoutline_types::JobRecord;

use crate::error::ApiError;
use crate::state::AppState;

#[utoipa::path(get, path = "/job/{id}", responses((status = 200, body = JobRecord), (status = 404)))]
pub async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<JobRecord>, ApiError> {
    state.jobs.snapshot(id).map(Json).ok_or(ApiError::JobNotFound(id))
}

#[utoipa::path(get, path = "/job/{id}/stream", responses((status = 200, description = "text/event-stream")))]
pub async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state.jobs.subscribe(id).ok_or(ApiError::JobNotFound(id))?;

    let stream = async_stream::stream! {
        for event in subscription.history {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }

        if subscription.is_terminal {
            return;
        }

        let mut receiver = subscription.receiver;
        while let Ok(event) = receiver.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("heartbeat")))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/job/{id}", get(get_job)).route("/job/{id}/stream", get(stream_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use scoutline_jobs::{JobRunner, JobRunnerConfig};
    use tower::ServiceExt;

    fn state_with_jobs(runner: JobRunner) -> Arc<AppState> {
        Arc::new(AppState {
            start_time: std::time::Instant::now(),
            search: crate::test_support::empty_search_engine(),
            jobs: Arc::new(runner),
            rerank: None,
            vendor: None,
            fit: None,
            vector_store_configured: false,
        })
    }

    #[tokio::test]
    async fn unknown_job_returns_404() {
        let state = state_with_jobs(JobRunner::new(JobRunnerConfig::default()));
        let app = router().with_state(state);
        let response = app
            .oneshot(Request::builder().uri(format!("/job/{}", Uuid::new_v4())).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn finished_job_snapshot_is_returned() {
        let runner = JobRunner::new(JobRunnerConfig::default());
        let response = runner.enqueue("default", serde_json::json!({}), |_sink| async move { Ok(serde_json::json!({"ok": true})) });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = state_with_jobs(runner);
        let app = router().with_state(state);
        let resp = app
            .oneshot(Request::builder().uri(format!("/job/{}", response.job_id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stream_of_finished_job_replays_history_then_closes() {
        let runner = JobRunner::new(JobRunnerConfig::default());
        let response = runner.enqueue("default", serde_json::json!({}), |sink| async move {
            sink(scoutline_types::ProgressEvent::new("A", serde_json::json!({})));
            Ok(serde_json::json!({}))
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = state_with_jobs(runner);
        let app = router().with_state(state);
        let resp = app
            .oneshot(Request::builder().uri(format!("/job/{}/stream", response.job_id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();
        assert!(body_str.contains("\"stage\":\"A\""));
    }
}
