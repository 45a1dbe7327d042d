//! Inbound HTTP surface: media server triggers, uploads and run status.

use crate::application::pipeline::{PipelineController, RunReport, RunState};
use crate::domain::jobs::UploadVodRequest;
use crate::domain::trigger::RECORDING_END;
use crate::error::Error;
use crate::ports::callback::StatusCallbackPort;
use crate::ports::media_server::MediaServerPort;
use crate::ports::transcode::TranscodePort;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Header the media server names its trigger in.
pub const TRIGGER_HEADER: &str = "X-Trigger";

#[derive(Debug, Serialize)]
pub struct UploadVodResponse {
    pub stream_name: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatusResponse {
    Running { stream_name: String },
    Finished(RunReport),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = if self.is_malformed_input() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router<M, C, T>(controller: PipelineController<M, C, T>) -> Router
where
    M: MediaServerPort + 'static,
    C: StatusCallbackPort + 'static,
    T: TranscodePort + 'static,
{
    Router::new()
        .route("/ok", get(ok))
        .route("/api/mist/trigger", post(trigger::<M, C, T>))
        .route("/api/vod", post(upload_vod::<M, C, T>))
        .route("/api/vod/:stream_name", get(run_status::<M, C, T>))
        .with_state(controller)
}

async fn ok() -> &'static str {
    "OK"
}

async fn trigger<M, C, T>(
    State(controller): State<PipelineController<M, C, T>>,
    headers: HeaderMap,
    body: String,
) -> Response
where
    M: MediaServerPort + 'static,
    C: StatusCallbackPort + 'static,
    T: TranscodePort + 'static,
{
    let Some(name) = headers.get(TRIGGER_HEADER).and_then(|v| v.to_str().ok()) else {
        return (StatusCode::BAD_REQUEST, "missing X-Trigger header").into_response();
    };
    if name != RECORDING_END {
        debug!(trigger = name, "acknowledging unhandled trigger");
        return StatusCode::OK.into_response();
    }

    match controller.handle_recording_end(&body).await {
        Ok(report) => {
            debug!(outcome = ?report.outcome, non_fatal = report.non_fatal.len(), "RECORDING_END handled");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!(error = %e, "rejecting RECORDING_END");
            e.into_response()
        }
    }
}

async fn upload_vod<M, C, T>(
    State(controller): State<PipelineController<M, C, T>>,
    Json(request): Json<UploadVodRequest>,
) -> Result<Json<UploadVodResponse>, Error>
where
    M: MediaServerPort + 'static,
    C: StatusCallbackPort + 'static,
    T: TranscodePort + 'static,
{
    let stream_name = controller.start_segmenting(request).await.map_err(|e| {
        error!(error = %e, "upload rejected");
        e
    })?;
    Ok(Json(UploadVodResponse { stream_name }))
}

async fn run_status<M, C, T>(
    State(controller): State<PipelineController<M, C, T>>,
    Path(stream_name): Path<String>,
) -> Response
where
    M: MediaServerPort + 'static,
    C: StatusCallbackPort + 'static,
    T: TranscodePort + 'static,
{
    match controller.runs().state(&stream_name).await {
        Some(RunState::Running) => Json(RunStatusResponse::Running { stream_name }).into_response(),
        Some(RunState::Finished(report)) => {
            Json(RunStatusResponse::Finished(report)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            format!("no transcode run for {}", stream_name),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::JobCache;
    use crate::domain::jobs::{OutputVideo, StreamJob};
    use crate::domain::media::SourceStreamInfo;
    use crate::ports::callback::MockStatusCallbackPort;
    use crate::ports::media_server::MockMediaServerPort;
    use crate::ports::transcode::MockTranscodePort;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    const STREAM: &str = "catalyst_vod_http";

    fn app(
        media: MockMediaServerPort,
        callbacks: MockStatusCallbackPort,
        transcoder: MockTranscodePort,
    ) -> (Router, PipelineController<MockMediaServerPort, MockStatusCallbackPort, MockTranscodePort>)
    {
        let cache = Arc::new(JobCache::new());
        cache.segmenting.store(
            STREAM,
            StreamJob {
                stream_name: STREAM.to_string(),
                callback_url: "http://callback".to_string(),
                source_file: "http://source.mp4".to_string(),
                access_token: None,
                transcode_api_url: None,
                upload_url: "/data/out".to_string(),
            },
        );
        let controller = PipelineController::new(media, callbacks, transcoder, cache, 10);
        (router(controller.clone()), controller)
    }

    fn trigger_request(trigger: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/api/mist/trigger");
        if let Some(trigger) = trigger {
            builder = builder.header(TRIGGER_HEADER, trigger);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ok() {
        let (app, _) = app(
            MockMediaServerPort::new(),
            MockStatusCallbackPort::new(),
            MockTranscodePort::new(),
        );
        let response = app
            .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_trigger_rejections_and_acknowledgements() {
        let (app, controller) = app(
            MockMediaServerPort::new(),
            MockStatusCallbackPort::new(),
            MockTranscodePort::new(),
        );

        let response = app
            .clone()
            .oneshot(trigger_request(None, "x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(trigger_request(Some("PUSH_END"), "anything"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(trigger_request(Some(RECORDING_END), "catalyst_vod_http\nonly-two"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("expected 10 lines"));
        assert!(controller.cache().segmenting.get(STREAM).is_ok());
    }

    #[tokio::test]
    async fn test_recording_end_launches_run_and_reports_status() {
        let mut media = MockMediaServerPort::new();
        media.expect_delete_stream().returning(|_| Ok(()));
        media
            .expect_stream_info()
            .returning(|_| Ok(SourceStreamInfo::default()));
        let mut callbacks = MockStatusCallbackPort::new();
        callbacks.expect_send().returning(|_, _| Ok(()));
        let mut transcoder = MockTranscodePort::new();
        transcoder.expect_run().returning(|_, _, _| {
            Ok(vec![OutputVideo {
                kind: "object_store".to_string(),
                manifest: "/data/out/index.m3u8".to_string(),
            }])
        });
        let (app, controller) = app(media, callbacks, transcoder);

        let response = app
            .clone()
            .oneshot(trigger_request(
                Some(RECORDING_END),
                "catalyst_vod_http\n/f\nhls\n100\n2\n1000\n1010\n0\n0\n0\n",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        controller.runs().wait(STREAM).await.unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/vod/{}", STREAM))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "finished");
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["outputs"][0]["manifest"], "/data/out/index.m3u8");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/vod/catalyst_vod_unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_vod() {
        let mut media = MockMediaServerPort::new();
        media.expect_add_stream().returning(|_, _| Ok(()));
        media.expect_push_start().returning(|_, _| Ok(()));
        let mut callbacks = MockStatusCallbackPort::new();
        callbacks.expect_send().returning(|_, _| Ok(()));
        let (app, controller) = app(media, callbacks, MockTranscodePort::new());

        let request = serde_json::json!({
            "url": "http://source/video.mp4",
            "callback_url": "http://callback",
            "output_locations": [{"type": "object_store", "url": "/data/out2"}],
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/vod")
                    .header("content-type", "application/json")
                    .body(Body::from(request.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let stream_name = json["stream_name"].as_str().unwrap();
        assert_eq!(
            controller.cache().segmenting.get(stream_name).unwrap().upload_url,
            "/data/out2"
        );

        let invalid = serde_json::json!({
            "url": "http://source/video.mp4",
            "callback_url": "http://callback",
            "output_locations": [],
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/vod")
                    .header("content-type", "application/json")
                    .body(Body::from(invalid.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
