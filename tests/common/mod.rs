//! Shared test infrastructure for the end-to-end query tests.
//!
//! Queries are built and responses parsed with hickory-proto, so the wire
//! codec is checked against an independent implementation rather than
//! against itself.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType as HickoryType};

use tiller_dns::ratelimit::RateLimiter;
use tiller_dns::record::RecordType;
use tiller_dns::store::{NewRecord, Store, Zone};
use tiller_dns::{LookupCache, QueryEngine};

/// Source address used by most tests.
pub const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9));

// --- Store seeding ---

/// Builds a seeded in-memory store one zone at a time.
pub struct TestStoreBuilder {
    store: Arc<Store>,
}

impl TestStoreBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Store::open_in_memory().expect("in-memory store")),
        }
    }

    /// Create a zone with its SOA and NS apex rows.
    pub fn zone(&self, name: &str) -> Zone {
        let zone = self.store.create_zone(name).expect("create zone");
        let soa = format!("ns1.{name}. admin.{name}. 1 3600 600 604800 60");
        self.store
            .insert_record(&NewRecord::new(
                zone.id,
                &zone.apex(),
                RecordType::Soa,
                3600,
                &soa,
            ))
            .expect("insert SOA");
        self.store
            .insert_record(&NewRecord::new(
                zone.id,
                &zone.apex(),
                RecordType::Ns,
                3600,
                &format!("ns1.{name}."),
            ))
            .expect("insert NS");
        zone
    }

    /// Add a plain record.
    pub fn record(&self, zone: &Zone, fqdn: &str, rtype: RecordType, value: &str) -> i64 {
        self.store
            .insert_record(&NewRecord::new(zone.id, fqdn, rtype, 60, value))
            .expect("insert record")
    }

    /// Add an A record with weight and geo targeting.
    pub fn a_record_with(
        &self,
        zone: &Zone,
        fqdn: &str,
        value: &str,
        weight: u32,
        geo_cidrs: &str,
        healthcheck_url: Option<&str>,
    ) -> i64 {
        let mut record = NewRecord::new(zone.id, fqdn, RecordType::A, 60, value);
        record.weight = weight;
        record.geo_cidrs = geo_cidrs;
        record.healthcheck_url = healthcheck_url;
        self.store.insert_record(&record).expect("insert record")
    }

    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// An engine over this store with a wide-open rate limiter.
    pub fn engine(&self, cache_ttl: Duration) -> QueryEngine {
        self.engine_with_limiter(cache_ttl, RateLimiter::new(1e6, 1e6, Duration::from_secs(1)))
    }

    /// An engine with a caller-supplied limiter, plus the cache handle.
    pub fn engine_with_limiter(&self, cache_ttl: Duration, limiter: RateLimiter) -> QueryEngine {
        QueryEngine::new(self.store(), LookupCache::new(cache_ttl), limiter)
    }

    /// An engine sharing an externally owned cache.
    pub fn engine_with_cache(&self, cache: LookupCache) -> QueryEngine {
        QueryEngine::new(
            self.store(),
            cache,
            RateLimiter::new(1e6, 1e6, Duration::from_secs(1)),
        )
    }
}

// --- Query construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query(name: &str, rtype: HickoryType, id: u16) -> Vec<u8> {
    build_query_class(name, rtype, DNSClass::IN, id)
}

/// Build a query in an arbitrary class.
pub fn build_query_class(name: &str, rtype: HickoryType, class: DNSClass, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(rtype);
    query.set_query_class(class);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Run one query through the engine and parse the reply with hickory.
pub fn execute_query(engine: &QueryEngine, name: &str, rtype: HickoryType, src: IpAddr) -> Message {
    let bytes = build_query(name, rtype, 7777);
    let response = engine
        .handle_packet(&bytes, src)
        .expect("expected a response, got a drop");
    Message::from_vec(&response).expect("failed to parse response")
}

// --- Response helpers ---

/// Extract A addresses from the answer section.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            Some(RData::A(a)) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert an authoritative NOERROR answer with exactly one A record.
pub fn assert_single_a(msg: &Message, expected: Ipv4Addr) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(msg.authoritative(), "AA flag not set");
    let ips = extract_a_ips(msg);
    assert_eq!(ips, vec![expected], "unexpected answer set");
}

/// The SOA serial found in the authority section, if any.
pub fn authority_soa_serial(msg: &Message) -> Option<u32> {
    msg.name_servers().iter().find_map(|r| match r.data() {
        Some(RData::SOA(soa)) => Some(soa.serial()),
        _ => None,
    })
}
