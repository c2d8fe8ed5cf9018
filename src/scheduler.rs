//! Per-tenant reconciliation scheduling.
//!
//! Each tenant moves through `Idle -> Dirty -> Running -> Idle`. Marking a tenant
//! dirty schedules exactly one delayed hand-off to the worker queue; further
//! markings inside the debounce window coalesce into it. Markings that arrive while
//! a pass is running set a follow-up flag instead of starting a second pass, so
//! one tenant is never reconciled twice at once. Distinct tenants run in parallel
//! up to the configured concurrency.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// One reconciliation pass for one tenant.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    async fn reconcile(&self, tenant: &str) -> Result<()>;

    /// Called once a tenant has failed `failure_event_threshold` passes in a row,
    /// and on every failure after that.
    async fn report_failure(&self, tenant: &str, consecutive_failures: u32, error: &Error) {
        error!(tenant, consecutive_failures, error = %error, "tenant keeps failing to reconcile");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantState {
    Idle,
    Dirty,
    Running { follow_up: bool },
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub failure_event_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            concurrency: 8,
            queue_capacity: 1024,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            failure_event_threshold: 3,
        }
    }
}

impl SchedulerConfig {
    /// Exponential backoff after the `failures`-th consecutive failure, capped.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_max)
    }
}

#[derive(Debug)]
struct Entry {
    state: TenantState,
    failures: u32,
}

struct Shared {
    entries: Mutex<HashMap<String, Entry>>,
    queue: mpsc::Sender<String>,
    config: SchedulerConfig,
}

/// Cheap handle for marking tenants dirty from intake and resync.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

pub struct Scheduler {
    handle: SchedulerHandle,
    queue: mpsc::Receiver<String>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            entries: Mutex::new(HashMap::new()),
            queue: tx,
            config,
        });
        Self {
            handle: SchedulerHandle { shared },
            queue: rx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Drain the queue until `shutdown` resolves. Passes already started when
    /// shutdown fires run to completion before this returns.
    pub async fn run<R, F>(self, reconciler: Arc<R>, shutdown: F)
    where
        R: Reconciler,
        F: Future<Output = ()> + Send,
    {
        let handle = self.handle;
        let concurrency = handle.shared.config.concurrency.max(1);
        ReceiverStream::new(self.queue)
            .take_until(shutdown)
            .for_each_concurrent(concurrency, |tenant| {
                let handle = handle.clone();
                let reconciler = reconciler.clone();
                async move { handle.process(reconciler.as_ref(), tenant).await }
            })
            .await;
        debug!("scheduler stopped");
    }
}

impl SchedulerHandle {
    pub async fn mark_dirty(&self, tenant: &str) {
        let mut entries = self.shared.entries.lock().await;
        let entry = entries.entry(tenant.to_string()).or_insert(Entry {
            state: TenantState::Idle,
            failures: 0,
        });
        let state = entry.state;
        match state {
            TenantState::Idle => {
                entry.state = TenantState::Dirty;
                drop(entries);
                self.enqueue_after(tenant.to_string(), self.shared.config.debounce);
            }
            TenantState::Dirty => debug!(tenant, "already dirty; coalesced"),
            TenantState::Running { .. } => {
                entry.state = TenantState::Running { follow_up: true };
                debug!(tenant, "dirty while running; follow-up pass scheduled");
            }
        }
    }

    pub async fn mark_all_dirty<I, S>(&self, tenants: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tenant in tenants {
            self.mark_dirty(tenant.as_ref()).await;
        }
    }

    pub async fn state(&self, tenant: &str) -> TenantState {
        self.shared
            .entries
            .lock()
            .await
            .get(tenant)
            .map(|e| e.state)
            .unwrap_or(TenantState::Idle)
    }

    pub async fn consecutive_failures(&self, tenant: &str) -> u32 {
        self.shared
            .entries
            .lock()
            .await
            .get(tenant)
            .map(|e| e.failures)
            .unwrap_or(0)
    }

    fn enqueue_after(&self, tenant: String, delay: Duration) {
        let queue = self.shared.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if queue.send(tenant).await.is_err() {
                debug!("scheduler queue closed; dropping hand-off");
            }
        });
    }

    async fn process<R: Reconciler>(&self, reconciler: &R, tenant: String) {
        if !self.begin(&tenant).await {
            return;
        }

        match reconciler.reconcile(&tenant).await {
            Ok(()) => self.complete(&tenant).await,
            Err(e) => {
                let failures = self.fail(&tenant).await;
                warn!(tenant = %tenant, failures, error = %e, "reconciliation pass failed");
                if failures >= self.shared.config.failure_event_threshold {
                    reconciler.report_failure(&tenant, failures, &e).await;
                }
            }
        }
    }

    async fn begin(&self, tenant: &str) -> bool {
        let mut entries = self.shared.entries.lock().await;
        match entries.get_mut(tenant) {
            Some(entry) if entry.state == TenantState::Dirty => {
                entry.state = TenantState::Running { follow_up: false };
                true
            }
            other => {
                debug!(tenant, state = ?other.map(|e| e.state), "stale hand-off ignored");
                false
            }
        }
    }

    async fn complete(&self, tenant: &str) {
        let mut entries = self.shared.entries.lock().await;
        let follow_up = matches!(
            entries.get(tenant).map(|e| e.state),
            Some(TenantState::Running { follow_up: true })
        );
        if follow_up {
            if let Some(entry) = entries.get_mut(tenant) {
                entry.state = TenantState::Dirty;
                entry.failures = 0;
            }
            drop(entries);
            self.enqueue_after(tenant.to_string(), self.shared.config.debounce);
        } else {
            entries.remove(tenant);
        }
    }

    /// Back to dirty after a backoff; returns the consecutive failure count.
    async fn fail(&self, tenant: &str) -> u32 {
        let mut entries = self.shared.entries.lock().await;
        let entry = entries.entry(tenant.to_string()).or_insert(Entry {
            state: TenantState::Dirty,
            failures: 0,
        });
        entry.failures += 1;
        entry.state = TenantState::Dirty;
        let failures = entry.failures;
        drop(entries);
        self.enqueue_after(tenant.to_string(), self.shared.config.backoff(failures));
        failures
    }
}
