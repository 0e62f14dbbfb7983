//! UDP DNS server loop and the per-datagram query pipeline.
//!
//! [`QueryEngine`] is the whole pipeline as a pure-ish function over bytes
//! (parse, rate check, lookup, select, serialize), so the end-to-end tests
//! exercise it without touching a socket. [`DnsServer`] owns the socket and
//! feeds it.

use crate::cache::LookupCache;
use crate::config::Config;
use crate::error::DnsError;
use crate::metrics::{self, QueryOutcome};
use crate::ratelimit::RateLimiter;
use crate::record::{RecordType, StoredRecord, CLASS_IN, QTYPE_ANY};
use crate::selection;
use crate::store::Store;
use crate::wire::{self, Answer, QueryContext, Rcode};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Largest datagram we accept; queries without EDNS stay well under this.
const MAX_DATAGRAM: usize = 4096;

/// The datagram-to-datagram query pipeline.
pub struct QueryEngine {
    store: Arc<Store>,
    cache: LookupCache,
    limiter: RateLimiter,
}

impl QueryEngine {
    /// Assemble the pipeline from its parts.
    pub fn new(store: Arc<Store>, cache: LookupCache, limiter: RateLimiter) -> Self {
        Self {
            store,
            cache,
            limiter,
        }
    }

    /// Handle one datagram. `None` means drop without replying.
    pub fn handle_packet(&self, buf: &[u8], src: IpAddr) -> Option<Vec<u8>> {
        let started = Instant::now();
        let Some(ctx) = wire::parse_query(buf) else {
            trace!(%src, len = buf.len(), "dropping malformed datagram");
            metrics::record_query("unknown", QueryOutcome::Dropped, started.elapsed());
            return None;
        };
        let qtype_label = qtype_label(ctx.qtype);

        if !self.limiter.check(src) {
            debug!(%src, qname = %ctx.qname, "rate limited");
            metrics::record_query(qtype_label, QueryOutcome::Refused, started.elapsed());
            return Some(wire::build_rejection(&ctx, Rcode::Refused));
        }

        if ctx.qclass != CLASS_IN {
            debug!(%src, qclass = ctx.qclass, "unsupported query class");
            metrics::record_query(qtype_label, QueryOutcome::NotImp, started.elapsed());
            return Some(wire::build_rejection(&ctx, Rcode::NotImp));
        }

        match self.answer(&ctx, src) {
            Ok((response, outcome)) => {
                metrics::record_query(qtype_label, outcome, started.elapsed());
                Some(response)
            }
            Err(e) => {
                warn!(%src, qname = %ctx.qname, error = %e, "query failed, sending SERVFAIL");
                metrics::record_query(qtype_label, QueryOutcome::ServFail, started.elapsed());
                Some(wire::build_rejection(&ctx, Rcode::ServFail))
            }
        }
    }

    fn answer(&self, ctx: &QueryContext, src: IpAddr) -> Result<(Vec<u8>, QueryOutcome), DnsError> {
        let rows = self.lookup_cached(&ctx.qname)?;
        let zone = self.store.resolve_zone(&ctx.qname)?;

        let selected = selection::select(&rows, ctx.qtype, Some(src), &mut rand::thread_rng());
        let mut answers: Vec<Answer> = selected.into_iter().map(to_answer).collect();
        if zone.is_none() {
            // rows without a zone can only be leftovers; never answer for them
            answers.clear();
        }

        let (authority, outcome) = match (&zone, answers.is_empty()) {
            (None, _) => (Vec::new(), QueryOutcome::NxDomain),
            (Some(_), false) => (Vec::new(), QueryOutcome::Answered),
            (Some(zone), true) => {
                let authority = self
                    .store
                    .authority(zone)?
                    .into_iter()
                    .map(to_answer)
                    .collect();
                (authority, QueryOutcome::NoData)
            }
        };

        let response = wire::build_response(ctx, &answers, &authority, zone.is_some())?;
        Ok((response, outcome))
    }

    fn lookup_cached(&self, qname: &str) -> Result<Arc<Vec<StoredRecord>>, DnsError> {
        if let Some(rows) = self.cache.get(qname) {
            metrics::record_cache_lookup(true);
            return Ok(rows);
        }
        metrics::record_cache_lookup(false);
        let rows = Arc::new(self.store.lookup(qname)?);
        self.cache.insert(qname, Arc::clone(&rows));
        Ok(rows)
    }

    /// Reap idle rate-limit entries.
    pub fn sweep_limiter(&self) {
        self.limiter.sweep();
    }
}

fn to_answer(row: StoredRecord) -> Answer {
    Answer {
        name: row.fqdn,
        rtype: row.rtype,
        ttl: row.ttl,
        data: row.data,
    }
}

fn qtype_label(qtype: u16) -> &'static str {
    if qtype == QTYPE_ANY {
        return "ANY";
    }
    match RecordType::from_u16(qtype) {
        Some(rtype) => rtype.as_str(),
        None => "other",
    }
}

/// Authoritative UDP DNS server.
pub struct DnsServer {
    config: Config,
    engine: Arc<QueryEngine>,
}

impl DnsServer {
    /// Wire a server from config, store and cache.
    pub fn new(config: Config, store: Arc<Store>, cache: LookupCache) -> Self {
        let limiter = RateLimiter::new(
            config.rate_limit_qps,
            config.rate_limit_burst,
            Duration::from_secs(config.rate_limit_block_seconds),
        );
        let engine = Arc::new(QueryEngine::new(store, cache, limiter));
        Self { config, engine }
    }

    /// The underlying engine, shared for tests and diagnostics.
    pub fn engine(&self) -> Arc<QueryEngine> {
        Arc::clone(&self.engine)
    }

    /// Serve queries until the token is cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), DnsError> {
        let listen = self.config.listen_addr();
        let socket = UdpSocket::bind(listen).await?;
        info!(addr = %listen, "DNS UDP listening");

        // reap idle limiter entries on the same cadence they expire
        let sweep_every = Duration::from_secs(self.config.rate_limit_block_seconds.max(1) * 10);
        let mut sweep = tokio::time::interval(sweep_every);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("DNS server shutting down");
                    return Ok(());
                }

                _ = sweep.tick() => {
                    self.engine.sweep_limiter();
                }

                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, src)) => {
                            if let Some(response) = self.engine.handle_packet(&buf[..len], src.ip()) {
                                if let Err(e) = socket.send_to(&response, src).await {
                                    warn!(%src, "failed to send response: {e}");
                                }
                            }
                        }
                        Err(e) => warn!("UDP receive error: {e}"),
                    }
                }
            }
        }
    }
}
