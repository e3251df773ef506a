//! HTTP surface for operating the projector.
//!
//! Every response body is the same envelope, `{ error, data }`: `error` is
//! `null` on success and a message on failure, `data` is `null` whenever
//! `error` is set. Device and protocol failures map to 500; the only 400 is
//! a brightness body carrying neither a direction nor a value. Metric reads
//! are served from the poller caches, so a burst of HTTP traffic costs the
//! device nothing.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::client::ProjectorClient;
use crate::commands::{Direction, PictureMode};
use crate::error::CommandError;
use crate::monitor::ProjectorMonitor;

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    error: Option<String>,
    data: Option<T>,
}

#[derive(Clone)]
struct AppState {
    client: ProjectorClient,
    monitor: Arc<ProjectorMonitor>,
}

#[derive(Debug, Deserialize)]
struct PowerBody {
    on: bool,
}

#[derive(Debug, Deserialize)]
struct VolumeBody {
    level: u8,
}

#[derive(Debug, Deserialize)]
struct PictureModeBody {
    mode: PictureMode,
}

#[derive(Debug, Deserialize)]
struct BrightnessBody {
    direction: Option<Direction>,
    value: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct LevelBody {
    value: u8,
}

/// Builds the REST router over a shared command client and monitor.
pub fn router(client: ProjectorClient, monitor: Arc<ProjectorMonitor>) -> Router {
    let state = AppState { client, monitor };

    Router::new()
        .route("/api/power-state", get(get_power_state))
        .route("/api/power", get(get_power).post(post_power))
        .route("/api/temperature", get(get_temperature))
        .route("/api/fan", get(get_fan))
        .route("/api/volume", get(get_volume).post(post_volume))
        .route("/api/picture-mode", get(get_picture_mode).post(post_picture_mode))
        .route("/api/brightness", get(get_brightness).post(post_brightness))
        .route("/api/contrast", get(get_contrast).post(post_contrast))
        .route("/api/sharpness", get(get_sharpness).post(post_sharpness))
        .route("/api/lamp-hours", get(get_lamp_hours))
        .with_state(state)
}

fn ok<T: Serialize>(data: T) -> Response {
    let body = ApiResponse {
        error: None,
        data: Some(data),
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ApiResponse::<()> {
        error: Some(message.into()),
        data: None,
    };
    (status, Json(body)).into_response()
}

fn internal(e: CommandError) -> Response {
    fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn ack_or_fail(result: crate::error::Result<()>) -> Response {
    match result {
        Ok(()) => ok(()),
        Err(e) => internal(e),
    }
}

/// Serves a poller cache. An empty cache is a failure from the operator's
/// point of view: the projector is off or stopped answering.
fn cached_reading<T: Serialize>(name: &str, value: Option<T>) -> Response {
    match value {
        Some(value) => ok(value),
        None => fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("no {name} reading available (projector off or unreachable)"),
        ),
    }
}

/// One fresh power read folded into the tracker, then the enriched
/// snapshot. The 2s poller would catch up on its own, but operators asking
/// for power state want the countdown against a reading taken now.
async fn get_power_state(State(state): State<AppState>) -> Response {
    match state.client.power_status().await {
        Ok(reading) => {
            let snapshot = state.monitor.tracker().observe_reading(reading);
            ok(snapshot.info(Instant::now()))
        }
        Err(e) => internal(e),
    }
}

async fn get_power(State(state): State<AppState>) -> Response {
    match state.client.power_status().await {
        Ok(reading) => ok(reading),
        Err(e) => internal(e),
    }
}

async fn post_power(State(state): State<AppState>, Json(body): Json<PowerBody>) -> Response {
    if let Err(e) = state.client.set_power(body.on).await {
        return internal(e);
    }

    // The device took the command, so start the matching timed phase.
    let snapshot = state.monitor.tracker().request_transition(body.on);
    ok(snapshot.info(Instant::now()))
}

async fn get_temperature(State(state): State<AppState>) -> Response {
    cached_reading("temperature", state.monitor.temperature())
}

async fn get_fan(State(state): State<AppState>) -> Response {
    cached_reading("fan speed", state.monitor.fan_speed())
}

async fn get_volume(State(state): State<AppState>) -> Response {
    cached_reading("volume", state.monitor.volume())
}

async fn get_picture_mode(State(state): State<AppState>) -> Response {
    cached_reading("picture mode", state.monitor.picture_mode())
}

async fn get_brightness(State(state): State<AppState>) -> Response {
    cached_reading("brightness", state.monitor.picture_settings().map(|s| s.brightness))
}

async fn get_contrast(State(state): State<AppState>) -> Response {
    cached_reading("contrast", state.monitor.picture_settings().map(|s| s.contrast))
}

async fn get_sharpness(State(state): State<AppState>) -> Response {
    cached_reading("sharpness", state.monitor.picture_settings().map(|s| s.sharpness))
}

async fn get_lamp_hours(State(state): State<AppState>) -> Response {
    cached_reading("lamp hours", state.monitor.lamp_hours())
}

async fn post_volume(State(state): State<AppState>, Json(body): Json<VolumeBody>) -> Response {
    ack_or_fail(state.client.set_volume(body.level).await)
}

async fn post_picture_mode(
    State(state): State<AppState>,
    Json(body): Json<PictureModeBody>,
) -> Response {
    ack_or_fail(state.client.set_picture_mode(body.mode).await)
}

/// Accepts `{ direction: "up" | "down" }` for a one-step nudge or
/// `{ value: n }` for an absolute level; direction wins when both are
/// present.
async fn post_brightness(
    State(state): State<AppState>,
    Json(body): Json<BrightnessBody>,
) -> Response {
    let result = match (body.direction, body.value) {
        (Some(direction), _) => state.client.step_brightness(direction).await,
        (None, Some(value)) => state.client.set_brightness(value).await,
        (None, None) => {
            return fail(
                StatusCode::BAD_REQUEST,
                "body must carry either a direction or a value",
            );
        }
    };

    ack_or_fail(result)
}

async fn post_contrast(State(state): State<AppState>, Json(body): Json<LevelBody>) -> Response {
    ack_or_fail(state.client.set_contrast(body.value).await)
}

async fn post_sharpness(State(state): State<AppState>, Json(body): Json<LevelBody>) -> Response {
    ack_or_fail(state.client.set_sharpness(body.value).await)
}

// =================================================================
// Tests

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::time::timeout;
    use tower::ServiceExt;

    use super::*;
    use crate::power::PowerPhase;
    use crate::test_support::FakeProjector;

    const WAIT: Duration = Duration::from_secs(5);

    /// Fast enough for cache-driven tests to converge quickly.
    const FAST_POLL: Duration = Duration::from_millis(20);

    /// One initial poll and then effectively none, for tests that need the
    /// tracker to hold still between steps.
    const SLOW_POLL: Duration = Duration::from_secs(60);

    async fn test_app(period: Duration) -> (FakeProjector, Arc<ProjectorMonitor>, Router) {
        let projector = FakeProjector::start().await;
        let client = projector.client();
        let monitor = Arc::new(ProjectorMonitor::start_with_period(client.clone(), period));
        let app = router(client, Arc::clone(&monitor));
        (projector, monitor, app)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn power_on_request_starts_the_warm_up() {
        let (projector, monitor, app) = test_app(SLOW_POLL).await;

        // The initial poll has to land first: a power-on request is only
        // honored from a settled OFF.
        let mut snapshots = monitor.tracker().subscribe();
        timeout(WAIT, snapshots.wait_for(|s| s.phase == PowerPhase::Off))
            .await
            .unwrap()
            .unwrap();

        let response = app
            .clone()
            .oneshot(post_request("/api/power", json!({"on": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["error"], Value::Null);
        assert_eq!(body["data"]["state"], json!("WARMING_UP"));
        assert_eq!(body["data"]["remainingSeconds"], json!(30));
        assert_eq!(body["data"]["powerOn"], json!(true));

        assert_eq!(projector.value("pow").as_deref(), Some("ON"));
    }

    #[tokio::test]
    async fn power_state_route_reads_the_device_fresh() {
        let (projector, _monitor, app) = test_app(SLOW_POLL).await;
        projector.set_value("pow", "ON");

        let response = app
            .clone()
            .oneshot(get_request("/api/power-state"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(
            body["data"],
            json!({"powerOn": true, "state": "ON", "remainingSeconds": 0})
        );

        projector.set_garble_replies(true);
        let response = app
            .clone()
            .oneshot(get_request("/api/power-state"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert!(body["error"].is_string());
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn power_route_returns_the_raw_reading() {
        let (projector, _monitor, app) = test_app(SLOW_POLL).await;
        projector.set_value("pow", "ON");

        let response = app.clone().oneshot(get_request("/api/power")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["data", "error"]);
        assert_eq!(body["data"], json!(true));

        // A busy device yields an unknown reading, not an error.
        projector.set_power_blocked(true);
        let response = app.clone().oneshot(get_request("/api/power")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["error"], Value::Null);
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn metric_routes_serve_the_shared_caches() {
        let (projector, monitor, app) = test_app(FAST_POLL).await;
        projector.set_value("pow", "ON");

        timeout(WAIT, monitor.subscribe_temperature().wait_for(|v| v.is_some()))
            .await
            .unwrap()
            .unwrap();
        timeout(WAIT, monitor.subscribe_fan_speed().wait_for(|v| v.is_some()))
            .await
            .unwrap()
            .unwrap();
        timeout(WAIT, monitor.subscribe_volume().wait_for(|v| v.is_some()))
            .await
            .unwrap()
            .unwrap();
        timeout(WAIT, monitor.subscribe_picture_mode().wait_for(|v| v.is_some()))
            .await
            .unwrap()
            .unwrap();
        timeout(WAIT, monitor.subscribe_picture_settings().wait_for(|v| v.is_some()))
            .await
            .unwrap()
            .unwrap();
        timeout(WAIT, monitor.subscribe_lamp_hours().wait_for(|v| v.is_some()))
            .await
            .unwrap()
            .unwrap();

        for (uri, expected) in [
            ("/api/temperature", json!(41)),
            ("/api/fan", json!(1420)),
            ("/api/volume", json!(5)),
            ("/api/picture-mode", json!("preset")),
            ("/api/brightness", json!(50)),
            ("/api/contrast", json!(50)),
            ("/api/sharpness", json!(10)),
            ("/api/lamp-hours", json!(803)),
        ] {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");

            let body = body_json(response).await;
            assert_eq!(body["error"], Value::Null, "{uri}");
            assert_eq!(body["data"], expected, "{uri}");
        }

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn metric_routes_fail_while_the_projector_is_off() {
        let (_projector, _monitor, app) = test_app(SLOW_POLL).await;

        for uri in ["/api/temperature", "/api/brightness", "/api/lamp-hours"] {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");

            let body = body_json(response).await;
            assert!(body["error"].is_string(), "{uri}");
            assert_eq!(body["data"], Value::Null, "{uri}");
        }
    }

    #[tokio::test]
    async fn brightness_post_requires_a_direction_or_a_value() {
        let (projector, _monitor, app) = test_app(SLOW_POLL).await;

        let response = app
            .clone()
            .oneshot(post_request("/api/brightness", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].is_string());

        let response = app
            .clone()
            .oneshot(post_request("/api/brightness", json!({"direction": "up"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(projector.value("bri").as_deref(), Some("51"));

        let response = app
            .clone()
            .oneshot(post_request("/api/brightness", json!({"value": 60})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(projector.value("bri").as_deref(), Some("60"));

        // Direction wins when both fields show up.
        let response = app
            .clone()
            .oneshot(post_request(
                "/api/brightness",
                json!({"direction": "down", "value": 10}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(projector.value("bri").as_deref(), Some("59"));
    }

    #[tokio::test]
    async fn setter_routes_drive_the_device() {
        let (projector, _monitor, app) = test_app(SLOW_POLL).await;

        let response = app
            .clone()
            .oneshot(post_request("/api/volume", json!({"level": 9})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(projector.value("vol").as_deref(), Some("9"));

        let response = app
            .clone()
            .oneshot(post_request("/api/picture-mode", json!({"mode": "cine"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(projector.value("appmod").as_deref(), Some("cine"));

        let response = app
            .clone()
            .oneshot(post_request("/api/contrast", json!({"value": 42})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(projector.value("con").as_deref(), Some("42"));

        let response = app
            .clone()
            .oneshot(post_request("/api/sharpness", json!({"value": 7})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(projector.value("sha").as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn rejected_commands_surface_as_internal_errors() {
        let (projector, _monitor, app) = test_app(SLOW_POLL).await;
        projector.set_reject_sets(true);

        let response = app
            .clone()
            .oneshot(post_request("/api/volume", json!({"level": 9})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        let error = body["error"].as_str().unwrap();
        assert!(error.contains("declined"), "unexpected error: {error}");
    }
}
