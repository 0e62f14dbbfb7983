//! Background health checker.
//!
//! On a fixed interval, probes every enabled record that carries a
//! `healthcheck_url` and writes the outcome back to the store. A record is
//! healthy exactly when its probe answered with an HTTP status below 500;
//! timeouts, transport failures and 5xx all mark it unhealthy. After each
//! pass the lookup cache is cleared so the new health bits take effect on
//! the very next query instead of after cache expiry.

use crate::cache::LookupCache;
use crate::error::DnsError;
use crate::metrics;
use crate::store::{HealthTarget, Store};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Probes in flight at once during a pass.
const PROBE_CONCURRENCY: usize = 16;

/// Stored error strings are capped at this many characters.
const MAX_ERROR_LEN: usize = 255;

/// Shortest allowed per-probe timeout.
pub const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Periodic HTTP health prober.
pub struct HealthChecker {
    store: Arc<Store>,
    cache: LookupCache,
    client: reqwest::Client,
    interval: Duration,
}

impl HealthChecker {
    /// Build a checker probing every `interval` with the given per-request
    /// timeout. The timeout is clamped to [`MIN_PROBE_TIMEOUT`].
    pub fn new(
        store: Arc<Store>,
        cache: LookupCache,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, DnsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout.max(MIN_PROBE_TIMEOUT))
            .build()?;
        Ok(Self {
            store,
            cache,
            client,
            interval,
        })
    }

    /// Run passes until cancelled. A zero interval disables the checker
    /// entirely, leaving every record at its stored health bit.
    pub async fn run(self, cancel: CancellationToken) {
        if self.interval.is_zero() {
            info!("health checker disabled (interval is zero)");
            return;
        }
        info!(interval_secs = self.interval.as_secs(), "health checker started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("health checker shutting down");
                    return;
                }

                _ = ticker.tick() => {
                    match self.run_pass().await {
                        Ok(0) => {}
                        Ok(probed) => debug!(probed, "health pass complete"),
                        Err(e) => warn!("health pass failed: {e}"),
                    }
                }
            }
        }
    }

    /// Probe every target once and write outcomes back.
    ///
    /// Returns the number of targets probed. Public so tests can drive
    /// passes without a timer.
    pub async fn run_pass(&self) -> Result<usize, DnsError> {
        let targets = self.store.health_targets()?;
        if targets.is_empty() {
            return Ok(0);
        }
        let started = Instant::now();
        let probed = targets.len();

        let outcomes: Vec<(HealthTarget, Result<(), String>)> = stream::iter(targets)
            .map(|target| {
                let client = self.client.clone();
                async move {
                    let outcome = probe(&client, &target.url).await;
                    (target, outcome)
                }
            })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect()
            .await;

        for (target, outcome) in outcomes {
            let healthy = outcome.is_ok();
            metrics::record_health_probe(healthy);
            let error = match &outcome {
                Ok(()) => None,
                Err(msg) => {
                    debug!(record_id = target.record_id, url = %target.url, error = %msg, "probe failed");
                    Some(truncate(msg))
                }
            };
            self.store
                .update_health(target.record_id, healthy, error.as_deref())?;
        }

        // health bits changed (or at least were rewritten): start fresh
        self.cache.clear();
        metrics::record_health_pass(probed, started.elapsed());
        Ok(probed)
    }
}

/// One GET against a probe URL. `Ok` means the record counts as healthy.
async fn probe(client: &reqwest::Client, url: &str) -> Result<(), String> {
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            if status.as_u16() < 500 {
                Ok(())
            } else {
                Err(format!("status {status}"))
            }
        }
        Err(e) => Err(e.to_string()),
    }
}

fn truncate(msg: &str) -> &str {
    match msg.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => &msg[..idx],
        None => msg,
    }
}
