use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use vpd_core::config::{Config, WarnLevel};
use vpd_core::policy::PolicyTable;
use vpd_core::state::ControllerState;
use vpd_server::controller::Controller;
use vpd_server::proxy::HttpDeviceProxy;
use vpd_server::state::AppState;

pub fn run(root: &Path, proxy_url: Option<&str>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load(root).context("failed to load config (run `vpdctl init` first)")?;
    if let Some(url) = proxy_url {
        config.devices.proxy_url = url.to_string();
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    let warnings = config.validate();
    for w in &warnings {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => tracing::error!("{}", w.message),
        }
    }
    if Config::has_errors(&warnings) {
        anyhow::bail!("config validation found errors; see `vpdctl config validate`");
    }

    let policy_path = config.policy_path(root);
    let policy = PolicyTable::load_or_empty(&policy_path)
        .with_context(|| format!("failed to load policy table {}", policy_path.display()))?;
    let state = ControllerState::load_or_default(root, config.stage)
        .context("failed to load controller state")?;
    config
        .stage_config(state.stage)
        .with_context(|| format!("persisted stage '{}' is not configured", state.stage))?;

    let proxy = Arc::new(
        HttpDeviceProxy::from_config(&config.devices).context("failed to set up device proxy")?,
    );
    let devices = proxy.devices(config.anomaly.enabled);
    let bind = format!("{}:{}", config.server.bind, config.server.port);
    let app = AppState::new(root.to_path_buf(), config, policy, state.stage);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        let addr = listener.local_addr()?;
        println!(
            "VPD controller running (stage {}, devices at {}), API on http://{addr}",
            state.stage,
            proxy.base_url()
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controller = Controller::new(app.clone(), devices, state);
        let mut control = tokio::spawn(controller.run(shutdown_rx.clone()));
        let mut server = tokio::spawn(vpd_server::serve_on(app, listener, shutdown_rx));

        let result = tokio::select! {
            res = &mut control => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("control loop failed")),
                Err(e) => Err(anyhow::anyhow!("control loop panicked: {e}")),
            },
            res = &mut server => match res {
                Ok(r) => r.context("API server failed"),
                Err(e) => Err(anyhow::anyhow!("API server panicked: {e}")),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
        };

        let _ = shutdown_tx.send(true);
        if !control.is_finished() {
            // lets an in-progress air exchange switch the exhaust back off
            match control.await {
                Ok(Err(e)) => tracing::warn!(error = %e, "control loop ended with error"),
                Err(e) => tracing::warn!(error = %e, "control loop task failed"),
                Ok(Ok(())) => {}
            }
        }
        if !server.is_finished() {
            let _ = server.await;
        }
        result
    })
}
