use anyhow::Result;
use kube::Client;
use tracing::info;

use tenant_observer::config::load_config;
use tenant_observer::runtime;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = load_config()?;
    info!(
        operator = %cfg.operator_name,
        namespace = %cfg.operator_namespace,
        tenant_label = %cfg.tenant_label,
        threshold_percent = cfg.health_policy.cpu_threshold_percent,
        debounce_ms = cfg.debounce.as_millis() as u64,
        resync_secs = cfg.resync_interval.as_secs(),
        workers = cfg.worker_concurrency,
        "configuration loaded"
    );

    let client = Client::try_default().await?;
    runtime::run(client, cfg).await
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
