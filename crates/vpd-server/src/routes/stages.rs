use axum::extract::State;
use axum::Json;

use vpd_core::types::GrowStage;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/stages: every configured stage and which one is active.
pub async fn list_stages(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "active": app.active_stage(),
        "stages": app.config.stages,
    }))
}

#[derive(serde::Deserialize)]
pub struct SetStageBody {
    pub stage: String,
}

/// PUT /api/stage: switch the active grow stage. Takes effect on the next
/// control cycle.
pub async fn set_stage(
    State(app): State<AppState>,
    Json(body): Json<SetStageBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stage: GrowStage = body.stage.trim().parse()?;
    app.config.stage_config(stage)?;
    let previous = app.stage.send_replace(stage);
    if previous != stage {
        tracing::info!(from = %previous, to = %stage, "stage change requested");
        app.notify();
    }
    Ok(Json(serde_json::json!({
        "stage": stage,
        "previous": previous,
    })))
}
