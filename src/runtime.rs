use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::collector::{ClusterSource, KubeClusterSource};
use crate::engine::TenantEngine;
use crate::index::{SharedTenantIndex, TenantIndex};
use crate::kubernetes::{EventRecorder, KubeTenantInfoStore};
use crate::metrics::TenantMetrics;
use crate::publisher::{Publisher, TenantInfoStore};
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerHandle};
use crate::server::{self, AppState};
use crate::types::Config;
use crate::watch::Intake;

const MIN_RESYNC_INTERVAL: Duration = Duration::from_secs(1);

pub fn scheduler_config(config: &Config) -> SchedulerConfig {
    SchedulerConfig {
        debounce: config.debounce,
        concurrency: config.worker_concurrency,
        failure_event_threshold: config.failure_event_threshold,
        ..Default::default()
    }
}

/// Run intake, scheduler, resync and the HTTP server until ctrl-c.
pub async fn run(client: Client, config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let index = TenantIndex::shared();
    let scheduler = Scheduler::new(scheduler_config(&config));
    let handle = scheduler.handle();

    let store = KubeTenantInfoStore::new(client.clone(), &config.operator_namespace, &config.operator_name);
    let publisher = Publisher::new(
        store,
        config.operator_namespace.clone(),
        config.operator_name.clone(),
        config.publish_max_attempts,
    );
    let events = EventRecorder::new(
        client.clone(),
        &config.operator_name,
        config.instance_name.clone(),
        &config.operator_namespace,
    );
    let metrics = TenantMetrics::new()?;
    let engine = Arc::new(
        TenantEngine::new(
            index.clone(),
            KubeClusterSource::new(client.clone()),
            publisher,
            config.health_policy.clone(),
        )
        .with_events(events)
        .with_metrics(metrics.clone()),
    );
    let state = Arc::new(AppState::new(engine.catalog(), config.health_policy.clone(), metrics));

    let intake = Intake::new(index.clone(), handle.clone(), config.tenant_label.clone());
    let intake_task = tokio::spawn(intake.run(client, shutdown(cancel.clone())));
    let scheduler_task = tokio::spawn(scheduler.run(engine.clone(), shutdown(cancel.clone())));
    let resync_task = tokio::spawn(resync_loop(
        engine,
        index,
        handle,
        config.resync_interval,
        cancel.clone(),
    ));
    let mut server_task = tokio::spawn(server::serve(config.health_port, state, shutdown(cancel.clone())));

    info!(namespace = %config.operator_namespace, label = %config.tenant_label, "tenant observer started");

    let mut server_done = false;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        }
        res = &mut server_task => {
            server_done = true;
            match res {
                Ok(Ok(())) => warn!("HTTP server exited"),
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
        }
    }
    cancel.cancel();

    // In-flight passes finish before the scheduler task returns.
    let _ = tokio::join!(intake_task, scheduler_task, resync_task);
    if !server_done {
        server_task.await??;
    }
    info!("tenant observer stopped");
    Ok(())
}

async fn shutdown(cancel: CancellationToken) {
    cancel.cancelled().await;
}

async fn resync_loop<C, S>(
    engine: Arc<TenantEngine<C, S>>,
    index: SharedTenantIndex,
    handle: SchedulerHandle,
    period: Duration,
    cancel: CancellationToken,
) where
    C: ClusterSource,
    S: TenantInfoStore,
{
    let mut ticker = tokio::time::interval(period.max(MIN_RESYNC_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the watch has not listed anything yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                resync(&engine, &index, &handle).await;
            }
        }
    }
}

/// Mark every known tenant dirty, plus tenants that only have a stale record left.
pub async fn resync<C, S>(engine: &TenantEngine<C, S>, index: &SharedTenantIndex, handle: &SchedulerHandle) -> usize
where
    C: ClusterSource,
    S: TenantInfoStore,
{
    let (mut tenants, synced) = {
        let index = index.read().await;
        (index.tenants(), index.is_synced())
    };
    if !synced {
        // Nothing is listed yet, so every published record would look orphaned.
        warn!("namespace watch not synced yet; skipping orphan sweep");
    } else {
        match engine.orphaned_tenants().await {
            Ok(orphans) => {
                if !orphans.is_empty() {
                    info!(?orphans, "records without live namespaces scheduled for removal");
                }
                tenants.extend(orphans);
            }
            Err(e) => warn!(error = %e, "failed to list published records; skipping orphan sweep"),
        }
    }
    info!(tenants = tenants.len(), "periodic resync");
    let count = tenants.len();
    handle.mark_all_dirty(tenants).await;
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TenantInfo;
    use crate::health::HealthPolicy;
    use crate::scheduler::TenantState;
    use crate::testing::{sample_spec, FakeCluster, MemoryStore};

    #[test]
    fn test_scheduler_config_from_config() {
        let config = crate::config::load_config_with_env(
            &crate::config::MockEnvironment::new()
                .with_var("DEBOUNCE_MILLIS", "250")
                .with_var("WORKER_CONCURRENCY", "3")
                .with_var("FAILURE_EVENT_THRESHOLD", "6"),
        )
        .unwrap();

        let sc = scheduler_config(&config);
        assert_eq!(sc.debounce, Duration::from_millis(250));
        assert_eq!(sc.concurrency, 3);
        assert_eq!(sc.failure_event_threshold, 6);
        assert_eq!(sc.queue_capacity, SchedulerConfig::default().queue_capacity);
    }

    #[tokio::test]
    async fn test_resync_marks_live_and_orphaned_tenants() {
        let index = TenantIndex::shared();
        index.write().await.replace_all(vec![
            ("a1".to_string(), Some("alpha".to_string())),
            ("b1".to_string(), Some("beta".to_string())),
        ]);
        let store = MemoryStore::default();
        store.insert(TenantInfo::new("stale-info", sample_spec("stale")));
        let publisher = Publisher::new(store, "tenant-observer", "tenant-observer", 5);
        let engine = TenantEngine::new(index.clone(), FakeCluster::default(), publisher, HealthPolicy::default());
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let handle = scheduler.handle();

        let marked = resync(&engine, &index, &handle).await;

        assert_eq!(marked, 3);
        for tenant in ["alpha", "beta", "stale"] {
            assert_eq!(handle.state(tenant).await, TenantState::Dirty, "{}", tenant);
        }
    }

    #[tokio::test]
    async fn test_resync_before_namespace_sync_keeps_records() {
        let index = TenantIndex::shared();
        let store = MemoryStore::default();
        store.insert(TenantInfo::new("alpha-info", sample_spec("alpha")));
        let publisher = Publisher::new(store.clone(), "tenant-observer", "tenant-observer", 5);
        let engine = TenantEngine::new(index.clone(), FakeCluster::default(), publisher, HealthPolicy::default());
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let handle = scheduler.handle();

        // The namespace watch has not delivered its initial listing
        assert_eq!(resync(&engine, &index, &handle).await, 0);
        assert_eq!(handle.state("alpha").await, TenantState::Idle);
        assert_eq!(store.names(), vec!["alpha-info"]);

        // An empty but complete listing does orphan the record
        index.write().await.replace_all(Vec::new());
        assert_eq!(resync(&engine, &index, &handle).await, 1);
        assert_eq!(handle.state("alpha").await, TenantState::Dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_loop_ticks_until_cancelled() {
        let index = TenantIndex::shared();
        index
            .write()
            .await
            .replace_all(vec![("a1".to_string(), Some("alpha".to_string()))]);
        let publisher = Publisher::new(MemoryStore::default(), "tenant-observer", "tenant-observer", 5);
        let engine = Arc::new(TenantEngine::new(
            index.clone(),
            FakeCluster::default(),
            publisher,
            HealthPolicy::default(),
        ));
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let handle = scheduler.handle();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(resync_loop(
            engine,
            index,
            handle.clone(),
            Duration::from_secs(10),
            cancel.clone(),
        ));

        // The immediate first tick is skipped
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state("alpha").await, TenantState::Idle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.state("alpha").await, TenantState::Dirty);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
