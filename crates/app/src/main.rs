//! bilimon - poll Bilibili endpoints on a schedule and append the results
//! as JSON lines.

use std::sync::Arc;

use anyhow::Context;
use bilimon_app::utils::logging::{error_label, init_tracing};
use bilimon_app::AppContext;
use bilimon_infra::{config, QrLoginFlow};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "could not load .env"),
    }

    let config = config::load().context("loading configuration")?;
    let ctx = AppContext::new(config).context("building application context")?;

    let login = QrLoginFlow::new(Arc::clone(ctx.auth.api()), &ctx.config.login);
    if let Err(e) = ctx.ensure_authenticated(&login).await {
        error!(kind = error_label(&e), error = %e, "authentication failed");
        return Err(e.into());
    }

    let mut scheduler = ctx.build_scheduler().context("building scheduler")?;
    scheduler.start()?;
    info!(tasks = scheduler.task_ids().count(), "bilimon running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown requested");

    scheduler.stop().await?;
    info!("bilimon stopped");
    Ok(())
}
