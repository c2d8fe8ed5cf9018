use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::health::HealthPolicy;
use crate::types::Config;

pub const DEFAULT_OPERATOR_NAME: &str = "tenant-observer";
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "tenant-observer";
pub const DEFAULT_TENANT_LABEL: &str = "capsule.clastix.io/tenant";

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let operator_name = non_empty(env, "OPERATOR_NAME").unwrap_or_else(|| DEFAULT_OPERATOR_NAME.to_string());
    let operator_namespace =
        non_empty(env, "OPERATOR_NAMESPACE").unwrap_or_else(|| DEFAULT_OPERATOR_NAMESPACE.to_string());
    let tenant_label = non_empty(env, "TENANT_LABEL").unwrap_or_else(|| DEFAULT_TENANT_LABEL.to_string());

    let threshold_percent: f64 = env
        .get_var("THRESHOLD_PERCENT")
        .unwrap_or_else(|| "80".to_string())
        .trim()
        .parse()
        .context("Invalid THRESHOLD_PERCENT")?;
    if !(0.0..=100.0).contains(&threshold_percent) {
        return Err(anyhow!("THRESHOLD_PERCENT must be within 0..=100, got {}", threshold_percent));
    }

    let debounce_millis: u64 = number_or(env, "DEBOUNCE_MILLIS", 2000);
    let resync_seconds: u64 = number_or(env, "RESYNC_INTERVAL_SECONDS", 300);

    let worker_concurrency: usize = number_or(env, "WORKER_CONCURRENCY", 8);
    if worker_concurrency == 0 {
        return Err(anyhow!("WORKER_CONCURRENCY must be greater than 0"));
    }
    let publish_max_attempts: u32 = number_or(env, "PUBLISH_MAX_ATTEMPTS", 5);
    if publish_max_attempts == 0 {
        return Err(anyhow!("PUBLISH_MAX_ATTEMPTS must be greater than 0"));
    }

    let failure_event_threshold: u32 = number_or(env, "FAILURE_EVENT_THRESHOLD", 3);
    let health_port: u16 = number_or(env, "HEALTH_PORT", 8080);

    Ok(Config {
        operator_name,
        operator_namespace,
        instance_name: non_empty(env, "HOSTNAME"),
        tenant_label,
        health_policy: HealthPolicy::with_utilization_threshold(threshold_percent),
        debounce: Duration::from_millis(debounce_millis),
        resync_interval: Duration::from_secs(resync_seconds),
        worker_concurrency,
        publish_max_attempts,
        failure_event_threshold,
        health_port,
    })
}

fn non_empty<E: EnvironmentProvider>(env: &E, key: &str) -> Option<String> {
    env.get_var(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Unparseable values fall back to `default`.
fn number_or<E: EnvironmentProvider, T: FromStr>(env: &E, key: &str, default: T) -> T {
    env.get_var(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
