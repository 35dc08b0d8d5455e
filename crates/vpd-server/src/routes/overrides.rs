use axum::extract::{Path, State};
use axum::Json;

use vpd_core::types::ActuatorKind;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/overrides: active overrides with their remaining lifetime.
pub async fn list_overrides(State(app): State<AppState>) -> Json<serde_json::Value> {
    let now = app.now();
    Json(serde_json::json!({
        "ttl_secs": app.overrides.ttl().as_secs(),
        "overrides": app.overrides.snapshot(now),
    }))
}

#[derive(serde::Deserialize)]
pub struct SetOverrideBody {
    pub state: bool,
}

/// POST /api/overrides/{actuator}: lock an actuator on or off until the TTL
/// runs out.
pub async fn set_override(
    State(app): State<AppState>,
    Path(actuator): Path<String>,
    Json(body): Json<SetOverrideBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let kind: ActuatorKind = actuator.parse()?;
    let now = app.now();
    app.overrides.set_override_checked(kind, body.state, now)?;
    tracing::info!(actuator = %kind, state = body.state, "override set");
    app.notify();

    let record = app.overrides.snapshot(now).into_iter().find(|o| o.actuator == kind);
    Ok(Json(serde_json::json!({
        "ok": true,
        "override": record,
    })))
}

/// DELETE /api/overrides/{actuator}: hand the actuator back to the rules.
pub async fn clear_override(
    State(app): State<AppState>,
    Path(actuator): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let kind: ActuatorKind = actuator.parse()?;
    let cleared = app.overrides.clear(kind);
    if cleared {
        tracing::info!(actuator = %kind, "override cleared");
        app.notify();
    }
    Ok(Json(serde_json::json!({
        "actuator": kind,
        "cleared": cleared,
    })))
}
