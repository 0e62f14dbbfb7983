//! tiller-dns - An authoritative DNS server with weighted, geo-targeted and
//! health-aware answer selection over a durable SQLite record store.
//!
//! The server answers UDP queries for the zones in its store. Every query
//! runs geo filtering (client subnet against per-record CIDR lists), a
//! liveness filter fed by background HTTP health probes, and a weighted
//! random pick for address-like types, so one name can split traffic across
//! many records. A token-authenticated dynamic-DNS endpoint rewrites
//! A-records in place.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          tiller-dns                            │
//! │                                                                │
//! │   UDP :5353 ──▶ wire::parse ──▶ rate limiter ──▶ lookup        │
//! │                                                   │            │
//! │                                  ┌────────────────┤            │
//! │                                  ▼                ▼            │
//! │                           lookup cache ◀──── SQLite store      │
//! │                                  │                ▲            │
//! │                                  ▼                │            │
//! │                        selection (geo ▸ health ▸ weight)       │
//! │                                  │                │            │
//! │   UDP reply ◀── wire::build ◀────┘                │            │
//! │                                                   │            │
//! │   health checker ── HTTP probes ──▶ update health─┤            │
//! │   HTTP /update  ── DDNS token  ──▶ replace A-row ─┘            │
//! │            (both clear the lookup cache on change)             │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The control plane (zone and record CRUD, credential issuance) lives in a
//! separate service writing the same SQLite file; it is expected to clear
//! this process's cache semantics by keeping the cache TTL short or calling
//! the same invalidation the DDNS path uses.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tiller_dns::{Config, DnsServer, LookupCache, Store};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let store = Arc::new(Store::open(&config.db_path)?);
//!     let cache = LookupCache::new(config.cache_ttl());
//!
//!     let cancel = CancellationToken::new();
//!     let server = DnsServer::new(config, store, cache);
//!     server.run(cancel).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod ddns;
pub mod error;
pub mod health;
pub mod metrics;
pub mod ratelimit;
pub mod record;
pub mod selection;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod wire;

// Re-export main types
pub use cache::LookupCache;
pub use config::Config;
pub use error::DnsError;
pub use health::HealthChecker;
pub use ratelimit::RateLimiter;
pub use record::{RecordData, RecordType, StoredRecord};
pub use server::{DnsServer, QueryEngine};
pub use store::Store;
