//! Metrics instrumentation for tiller-dns.
//!
//! All metrics are prefixed with `tiller_dns.`

use metrics::{counter, gauge, histogram};

/// Query outcome for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryOutcome {
    /// Answer section carried at least one record.
    Answered,
    /// Name is in a zone but had no matching rows.
    NoData,
    /// Name falls under no zone.
    NxDomain,
    /// Source was rate limited.
    Refused,
    /// Query class other than IN.
    NotImp,
    /// Malformed datagram, dropped without a reply.
    Dropped,
    /// Internal failure, SERVFAIL sent.
    ServFail,
}

/// Record one handled datagram.
pub fn record_query(qtype: &str, outcome: QueryOutcome, duration: std::time::Duration) {
    let outcome_str = match outcome {
        QueryOutcome::Answered => "answered",
        QueryOutcome::NoData => "no_data",
        QueryOutcome::NxDomain => "nxdomain",
        QueryOutcome::Refused => "refused",
        QueryOutcome::NotImp => "notimp",
        QueryOutcome::Dropped => "dropped",
        QueryOutcome::ServFail => "servfail",
    };

    counter!("tiller_dns.query.count", "type" => qtype.to_string(), "outcome" => outcome_str)
        .increment(1);
    histogram!("tiller_dns.query.duration.seconds", "type" => qtype.to_string())
        .record(duration.as_secs_f64());
}

/// Record a lookup-cache hit or miss.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("tiller_dns.cache.lookup.count", "result" => result).increment(1);
}

/// Record a whole-cache clear.
pub fn record_cache_clear() {
    counter!("tiller_dns.cache.clear.count").increment(1);
}

/// Record a source tripping the rate limiter.
pub fn record_rate_limited() {
    counter!("tiller_dns.ratelimit.blocked.count").increment(1);
}

/// Record the size of the rate-limit table after a sweep.
pub fn record_ratelimit_entries(entries: usize) {
    gauge!("tiller_dns.ratelimit.entries").set(entries as f64);
}

/// Record one health-probe outcome.
pub fn record_health_probe(healthy: bool) {
    let result = if healthy { "healthy" } else { "unhealthy" };
    counter!("tiller_dns.health.probe.count", "result" => result).increment(1);
}

/// Record a completed health pass.
pub fn record_health_pass(targets: usize, duration: std::time::Duration) {
    gauge!("tiller_dns.health.targets").set(targets as f64);
    histogram!("tiller_dns.health.pass.duration.seconds").record(duration.as_secs_f64());
}

/// Record a DDNS update.
pub fn record_ddns_update(changed: bool) {
    let changed_str = if changed { "true" } else { "false" };
    counter!("tiller_dns.ddns.update.count", "changed" => changed_str).increment(1);
}

/// Record a rejected DDNS update.
pub fn record_ddns_rejected(reason: &'static str) {
    counter!("tiller_dns.ddns.rejected.count", "reason" => reason).increment(1);
}
