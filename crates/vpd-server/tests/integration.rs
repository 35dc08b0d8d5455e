use axum::http::StatusCode;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use vpd_core::air_exchange::AirExchangeWindow;
use vpd_core::config::Config;
use vpd_core::policy::{PolicyEntry, PolicyTable, PolicyTableFile, TABLE_VERSION};
use vpd_core::types::{ActuatorKind, ActuatorState, GrowStage};
use vpd_server::state::{AppState, ControllerStatus};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bootstrap a tent directory with a default config and return shared state.
fn init_tent(dir: &TempDir) -> AppState {
    let config = Config::default();
    vpd_core::io::ensure_dir(&dir.path().join(vpd_core::paths::VPD_DIR)).unwrap();
    config.save(dir.path()).unwrap();
    AppState::new(
        dir.path().to_path_buf(),
        config,
        PolicyTable::empty(),
        GrowStage::Vegetative,
    )
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

/// Send a POST request with a JSON body via `oneshot`.
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

async fn put_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "PUT", uri, Some(body)).await
}

async fn delete(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "DELETE", uri, None).await
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_reports_stage_band_and_schedule() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);
    let (status, body) = get(vpd_server::build_router(state), "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "vegetative");
    assert_eq!(body["band"]["vpd_min"], 0.8);
    assert_eq!(body["band"]["vpd_max"], 1.2);
    assert_eq!(body["actuators"]["exhaust"], false);
    assert_eq!(body["cycles"], 0);
    assert!(body["next_air_exchange_secs"].as_u64().unwrap() <= 1800);
    assert_eq!(body["air_exchange_window_open"], false);
    assert!(body["overrides"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn status_reports_open_air_exchange_window() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);
    let now = state.now();
    let set_status = |minutes_ago: i64| {
        let window = AirExchangeWindow::starting_at(now - chrono::Duration::minutes(minutes_ago));
        state.status.send_replace(ControllerStatus::initial(
            GrowStage::Vegetative,
            ActuatorState::all_off(),
            window,
            now,
        ));
    };

    // vegetative: every 30 minutes for 4 minutes
    set_status(31);
    let (_, body) = get(vpd_server::build_router(state.clone()), "/api/status").await;
    assert_eq!(body["air_exchange_window_open"], true);
    assert_eq!(body["next_air_exchange_secs"], 0);

    set_status(40);
    let (_, body) = get(vpd_server::build_router(state.clone()), "/api/status").await;
    assert_eq!(body["air_exchange_window_open"], false);
    assert_eq!(body["next_air_exchange_secs"], 0);
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

#[tokio::test]
async fn set_and_list_override() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);

    let (status, body) = post_json(
        vpd_server::build_router(state.clone()),
        "/api/overrides/exhaust",
        serde_json::json!({ "state": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["override"]["actuator"], "exhaust");
    assert_eq!(body["override"]["desired_state"], true);

    let (status, body) = get(vpd_server::build_router(state.clone()), "/api/overrides").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ttl_secs"], 3000);
    let list = body["overrides"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["actuator"], "exhaust");

    assert_eq!(
        state.overrides.desired(ActuatorKind::Exhaust, state.now()),
        Some(true)
    );
}

#[tokio::test]
async fn unknown_actuator_is_404() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);
    let (status, body) = post_json(
        vpd_server::build_router(state),
        "/api/overrides/heater",
        serde_json::json!({ "state": true }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("heater"));
}

#[tokio::test]
async fn opposing_humidity_overrides_conflict() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);

    let (status, _) = post_json(
        vpd_server::build_router(state.clone()),
        "/api/overrides/humidifier",
        serde_json::json!({ "state": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(
        vpd_server::build_router(state.clone()),
        "/api/overrides/dehumidifier",
        serde_json::json!({ "state": true }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    // OFF never conflicts
    let (status, _) = post_json(
        vpd_server::build_router(state),
        "/api/overrides/dehumidifier",
        serde_json::json!({ "state": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn delete_override_reports_whether_one_existed() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);
    state
        .overrides
        .set_override(ActuatorKind::Humidifier, false, state.now());

    let (status, body) = delete(
        vpd_server::build_router(state.clone()),
        "/api/overrides/humidifier",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);

    let (_, body) = delete(vpd_server::build_router(state), "/api/overrides/humidifier").await;
    assert_eq!(body["cleared"], false);
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_stages_shows_defaults() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);
    let (status, body) = get(vpd_server::build_router(state), "/api/stages").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], "vegetative");
    assert_eq!(body["stages"]["flowering"]["vpd_min"], 1.2);
    assert_eq!(body["stages"]["propagation"]["max_humidity"], 70.0);
}

#[tokio::test]
async fn put_stage_updates_active_stage() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);
    let (status, body) = put_json(
        vpd_server::build_router(state.clone()),
        "/api/stage",
        serde_json::json!({ "stage": "flowering" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "flowering");
    assert_eq!(body["previous"], "vegetative");
    assert_eq!(state.active_stage(), GrowStage::Flowering);
}

#[tokio::test]
async fn put_unknown_stage_is_404() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);
    let (status, _) = put_json(
        vpd_server::build_router(state.clone()),
        "/api/stage",
        serde_json::json!({ "stage": "fruiting" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(state.active_stage(), GrowStage::Vegetative);
}

#[tokio::test]
async fn put_unconfigured_stage_is_404() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.stages.remove(&GrowStage::Propagation);
    let state = AppState::new(
        dir.path().to_path_buf(),
        config,
        PolicyTable::empty(),
        GrowStage::Vegetative,
    );
    let (status, _) = put_json(
        vpd_server::build_router(state),
        "/api/stage",
        serde_json::json!({ "stage": "propagation" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn policy_reload_swaps_table() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);

    let (status, body) = post_json(
        vpd_server::build_router(state.clone()),
        "/api/policy/reload",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 0);

    let file = PolicyTableFile {
        version: TABLE_VERSION,
        entries: vec![
            PolicyEntry {
                state: [60.0, 23.0, 24.0, 1.2, 1.0],
                values: vec![0.1, 0.9, 0.0, 0.0, 0.0, 0.0],
            },
            PolicyEntry {
                state: [45.0, 23.0, 24.0, 1.6, 1.5],
                values: vec![0.0, 0.0, 0.8, 0.0, 0.0, 0.0],
            },
        ],
    };
    let path = state.config.policy_path(dir.path());
    std::fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

    let (status, body) = post_json(
        vpd_server::build_router(state.clone()),
        "/api/policy/reload",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 2);
    assert_eq!(state.policy.current().len(), 2);
}

#[tokio::test]
async fn corrupt_policy_keeps_previous_table() {
    let dir = TempDir::new().unwrap();
    let state = init_tent(&dir);
    let path = state.config.policy_path(dir.path());
    std::fs::write(&path, "{ not json").unwrap();

    let (status, body) = post_json(
        vpd_server::build_router(state.clone()),
        "/api/policy/reload",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert!(state.policy.current().is_empty());
}
