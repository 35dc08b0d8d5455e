use axum::extract::State;
use axum::Json;

use vpd_core::air_exchange;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/status: the last published cycle plus live override and
/// air-exchange timing.
pub async fn get_status(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let now = app.now();
    let status = app.status.borrow().clone();
    let stage = app.config.stage_config(status.stage)?;
    let next_exchange = air_exchange::time_until_next(now, &status.window, stage);
    // open while a vent runs, and while a due vent is being deferred
    let window_open = air_exchange::is_active(now, &status.window, stage);

    Ok(Json(serde_json::json!({
        "stage": status.stage,
        "band": {
            "vpd_min": stage.vpd_min,
            "vpd_max": stage.vpd_max,
            "max_humidity": stage.max_humidity,
            "min_humidity": stage.min_humidity,
        },
        "actuators": status.actuators,
        "reading": status.reading,
        "vpd": status.vpd,
        "zone": status.zone,
        "venting": status.venting,
        "air_exchange_window_open": window_open,
        "next_air_exchange_secs": next_exchange.as_secs(),
        "last_air_exchange": status.window.last_exchange_at,
        "consecutive_fallbacks": status.consecutive_fallbacks,
        "last_decision": status.last_decision,
        "overrides": app.overrides.snapshot(now),
        "policy_entries": app.policy.current().len(),
        "cycles": status.cycles,
        "updated_at": status.updated_at,
    })))
}
