use axum::extract::State;
use axum::Json;

use vpd_core::policy::PolicyTable;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/policy/reload: re-read the policy table from disk and swap it
/// in atomically. A missing file yields an empty table.
pub async fn reload_policy(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let path = app.config.policy_path(&app.root);
    let load_path = path.clone();
    let table = tokio::task::spawn_blocking(move || PolicyTable::load_or_empty(&load_path))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    let entries = table.len();
    app.policy.swap(table);
    tracing::info!(entries, path = %path.display(), "policy table reloaded");
    app.notify();

    Ok(Json(serde_json::json!({
        "entries": entries,
        "path": path,
    })))
}
