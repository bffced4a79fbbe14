use anyhow::{Context, Result};
use madash::{
    config::Config,
    export::write_parquet,
    pipeline::{Dashboard, DashboardRequest},
};
use std::{env, fs, path::PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,madash=debug"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = Config::load_or_default(config_path.as_deref())?;
    let request = DashboardRequest::from_config(&config.request)
        .context("invalid request in config")?;
    fs::create_dir_all(&config.output.dir)
        .with_context(|| format!("creating output dir {}", config.output.dir.display()))?;

    // ─── 3) render ───────────────────────────────────────────────────
    let dashboard = Dashboard::from_config(&config)?;
    let snapshot = dashboard.snapshot(&request).await;

    let out = config.output.dir.join("dashboard.json");
    let json = serde_json::to_vec_pretty(&snapshot).context("serializing snapshot")?;
    fs::write(&out, json).with_context(|| format!("writing {}", out.display()))?;
    info!(path = %out.display(), "wrote snapshot");

    // ─── 4) optional export ──────────────────────────────────────────
    if config.output.export_parquet {
        match &snapshot.enriched {
            Some(table) => {
                let path = config.output.dir.join(format!(
                    "enriched_{}_{}.parquet",
                    request.period, request.state
                ));
                write_parquet(&table.to_record_batch()?, &path)?;
            }
            None => warn!("no enriched data to export"),
        }
    }

    info!("done");
    Ok(())
}
