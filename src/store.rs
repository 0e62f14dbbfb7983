//! Durable record store backed by SQLite.
//!
//! One connection guarded by a mutex serialises every operation; WAL
//! journalling with NORMAL synchronous keeps reads cheap while a writer
//! holds the lock only for its transaction. Hot statements go through
//! `prepare_cached`, so the compiled statements live with the connection
//! and are rebuilt automatically if the store is reopened.
//!
//! Names are canonicalised before they hit a query: zones are stored in
//! bare lower-case form (`example.com`), record owner names in trailing-dot
//! form (`app.example.com.`).

use crate::error::DnsError;
use crate::record::{canonical_name, parse_geo_cidrs, RecordData, RecordType, StoredRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Schema version the code expects; migrations step `user_version` up to it.
const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE zones (
    id          INTEGER PRIMARY KEY,
    user_id     INTEGER,
    name        TEXT NOT NULL UNIQUE,
    created_at  INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE TABLE records (
    id                   INTEGER PRIMARY KEY,
    zone_id              INTEGER NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    fqdn                 TEXT NOT NULL,
    type                 TEXT NOT NULL,
    ttl                  INTEGER NOT NULL,
    value                TEXT NOT NULL,
    weight               INTEGER NOT NULL DEFAULT 100,
    geo_cidrs            TEXT NOT NULL DEFAULT '',
    enabled              INTEGER NOT NULL DEFAULT 1,
    healthcheck_url      TEXT,
    healthy              INTEGER NOT NULL DEFAULT 1,
    last_health_check_at INTEGER,
    last_health_error    TEXT,
    created_at           INTEGER NOT NULL DEFAULT (unixepoch()),
    updated_at           INTEGER NOT NULL DEFAULT (unixepoch()),
    UNIQUE (zone_id, fqdn, type, value)
);

CREATE INDEX idx_records_fqdn_type ON records(fqdn, type);
CREATE INDEX idx_records_zone_fqdn_type ON records(zone_id, fqdn, type);
CREATE INDEX idx_records_healthcheck ON records(enabled, healthcheck_url);

CREATE TABLE ddns_credentials (
    id          INTEGER PRIMARY KEY,
    user_id     INTEGER NOT NULL DEFAULT 0,
    zone_id     INTEGER NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    fqdn        TEXT NOT NULL,
    token_hash  TEXT NOT NULL UNIQUE,
    ttl         INTEGER NOT NULL DEFAULT 60,
    enabled     INTEGER NOT NULL DEFAULT 1,
    created_at  INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE TABLE ddns_audit (
    id             INTEGER PRIMARY KEY,
    credential_id  INTEGER NOT NULL REFERENCES ddns_credentials(id) ON DELETE CASCADE,
    ip             TEXT NOT NULL,
    previous_value TEXT,
    new_value      TEXT NOT NULL,
    user_agent     TEXT,
    created_at     INTEGER NOT NULL DEFAULT (unixepoch())
);
";

const RECORD_COLS: &str =
    "id, zone_id, fqdn, type, ttl, value, weight, geo_cidrs, enabled, healthcheck_url, healthy";

/// A zone this server is authoritative for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Row id.
    pub id: i64,
    /// Bare lower-case zone name (`example.com`).
    pub name: String,
}

impl Zone {
    /// The apex owner name in canonical trailing-dot form.
    pub fn apex(&self) -> String {
        format!("{}.", self.name)
    }
}

/// A record due for health probing.
#[derive(Debug, Clone)]
pub struct HealthTarget {
    /// Record row id.
    pub record_id: i64,
    /// Probe URL.
    pub url: String,
}

/// A dynamic-DNS credential row (without the token hash).
#[derive(Debug, Clone)]
pub struct DdnsCredential {
    /// Row id, referenced by audit entries.
    pub id: i64,
    /// Zone the credential is scoped to.
    pub zone_id: i64,
    /// The single owner name this credential may rewrite.
    pub fqdn: String,
    /// TTL stamped on the replacement A-record.
    pub ttl: u32,
    /// Disabled credentials fail authentication.
    pub enabled: bool,
}

/// One row of the DDNS audit trail.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Effective client IP of the update.
    pub ip: String,
    /// A-record value before the update, if any.
    pub previous_value: Option<String>,
    /// A-record value after the update.
    pub new_value: String,
    /// Caller user agent, for diagnostics.
    pub user_agent: Option<String>,
}

/// New-record parameters for [`Store::insert_record`].
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    /// Owning zone row id.
    pub zone_id: i64,
    /// Owner name; canonicalised on insert.
    pub fqdn: &'a str,
    /// Record type.
    pub rtype: RecordType,
    /// TTL in seconds, 1 to 86400.
    pub ttl: u32,
    /// Textual value in the grammar for `rtype`.
    pub value: &'a str,
    /// Selection weight, 1 to 10000.
    pub weight: u32,
    /// Comma-separated CIDR list, may be empty.
    pub geo_cidrs: &'a str,
    /// Whether the row takes part in resolution.
    pub enabled: bool,
    /// Optional health-probe URL.
    pub healthcheck_url: Option<&'a str>,
}

impl<'a> NewRecord<'a> {
    /// A record with default weight, no geo targeting and no health probe.
    pub fn new(zone_id: i64, fqdn: &'a str, rtype: RecordType, ttl: u32, value: &'a str) -> Self {
        Self {
            zone_id,
            fqdn,
            rtype,
            ttl,
            value,
            weight: 100,
            geo_cidrs: "",
            enabled: true,
            healthcheck_url: None,
        }
    }
}

/// Handle over the SQLite store. Cheap to share behind an `Arc`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at `path`, applying pending migrations.
    pub fn open(path: &Path) -> Result<Self, DnsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened record store");
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, DnsError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DnsError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Rows for an exact canonical name, CNAME first, then id order.
    pub fn lookup(&self, fqdn: &str) -> Result<Vec<StoredRecord>, DnsError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RECORD_COLS} FROM records WHERE fqdn = ?1
             ORDER BY CASE type WHEN 'CNAME' THEN 0 WHEN 'A' THEN 1 WHEN 'AAAA' THEN 1 ELSE 2 END, id"
        ))?;
        let raw: Vec<RawRecord> = stmt
            .query_map(params![fqdn], RawRecord::from_row)?
            .collect::<Result<_, _>>()?;
        raw.into_iter().map(RawRecord::into_record).collect()
    }

    /// Find the longest zone whose name equals `fqdn` or is a proper
    /// label-boundary suffix of it.
    pub fn resolve_zone(&self, fqdn: &str) -> Result<Option<Zone>, DnsError> {
        let bare = fqdn.trim_end_matches('.');
        if bare.is_empty() {
            return Ok(None);
        }
        let conn = self.conn.lock();
        let labels: Vec<&str> = bare.split('.').collect();
        for start in 0..labels.len() {
            let candidate = labels[start..].join(".");
            let mut stmt = conn.prepare_cached("SELECT id, name FROM zones WHERE name = ?1")?;
            let zone = stmt
                .query_row(params![candidate], |row| {
                    Ok(Zone {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })
                .optional()?;
            if zone.is_some() {
                return Ok(zone);
            }
        }
        Ok(None)
    }

    /// SOA and NS rows at a zone's apex, SOA first.
    pub fn authority(&self, zone: &Zone) -> Result<Vec<StoredRecord>, DnsError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RECORD_COLS} FROM records
             WHERE zone_id = ?1 AND fqdn = ?2 AND type IN ('SOA', 'NS') AND enabled = 1
             ORDER BY CASE type WHEN 'SOA' THEN 0 ELSE 1 END, id"
        ))?;
        let raw: Vec<RawRecord> = stmt
            .query_map(params![zone.id, zone.apex()], RawRecord::from_row)?
            .collect::<Result<_, _>>()?;
        raw.into_iter().map(RawRecord::into_record).collect()
    }

    /// Enabled rows carrying a probe URL.
    pub fn health_targets(&self) -> Result<Vec<HealthTarget>, DnsError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, healthcheck_url FROM records
             WHERE enabled = 1 AND healthcheck_url IS NOT NULL AND healthcheck_url != ''
             ORDER BY id",
        )?;
        let targets = stmt
            .query_map([], |row| {
                Ok(HealthTarget {
                    record_id: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<Result<_, _>>()?;
        Ok(targets)
    }

    /// Write back one probe outcome.
    pub fn update_health(
        &self,
        record_id: i64,
        healthy: bool,
        error: Option<&str>,
    ) -> Result<(), DnsError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "UPDATE records SET healthy = ?2, last_health_error = ?3,
             last_health_check_at = ?4, updated_at = ?4 WHERE id = ?1",
        )?;
        stmt.execute(params![record_id, healthy, error, now_unix()])?;
        Ok(())
    }

    /// Create a zone; the name is stored bare and lower-case.
    pub fn create_zone(&self, name: &str) -> Result<Zone, DnsError> {
        let bare = name.trim().trim_end_matches('.').to_ascii_lowercase();
        if bare.is_empty() {
            return Err(DnsError::InvalidRecord("empty zone name".into()));
        }
        let conn = self.conn.lock();
        conn.execute("INSERT INTO zones (name) VALUES (?1)", params![bare])?;
        Ok(Zone {
            id: conn.last_insert_rowid(),
            name: bare,
        })
    }

    /// Delete a zone; records and credentials cascade away with it.
    pub fn delete_zone(&self, zone_id: i64) -> Result<(), DnsError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM zones WHERE id = ?1", params![zone_id])?;
        Ok(())
    }

    /// Validate and insert one record row, returning its id.
    pub fn insert_record(&self, record: &NewRecord<'_>) -> Result<i64, DnsError> {
        if !(1..=86_400).contains(&record.ttl) {
            return Err(DnsError::InvalidRecord(format!(
                "ttl out of range: {}",
                record.ttl
            )));
        }
        if !(1..=10_000).contains(&record.weight) {
            return Err(DnsError::InvalidRecord(format!(
                "weight out of range: {}",
                record.weight
            )));
        }
        // parse up front so bad values never reach the table
        RecordData::parse(record.rtype, record.value)?;
        parse_geo_cidrs(record.geo_cidrs)?;

        let fqdn = canonical_name(record.fqdn);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO records (zone_id, fqdn, type, ttl, value, weight, geo_cidrs, enabled, healthcheck_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        stmt.execute(params![
            record.zone_id,
            fqdn,
            record.rtype.as_str(),
            record.ttl,
            record.value.trim(),
            record.weight,
            record.geo_cidrs,
            record.enabled,
            record.healthcheck_url,
        ])?;
        Ok(conn.last_insert_rowid())
    }

    /// Store a credential; `token_hash` is the SHA-256 hex of the secret.
    pub fn create_ddns_credential(
        &self,
        zone_id: i64,
        fqdn: &str,
        token_hash: &str,
        ttl: u32,
    ) -> Result<i64, DnsError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ddns_credentials (zone_id, fqdn, token_hash, ttl) VALUES (?1, ?2, ?3, ?4)",
            params![zone_id, canonical_name(fqdn), token_hash, ttl],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Enable or disable a credential.
    pub fn set_ddns_credential_enabled(&self, id: i64, enabled: bool) -> Result<(), DnsError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE ddns_credentials SET enabled = ?2 WHERE id = ?1",
            params![id, enabled],
        )?;
        Ok(())
    }

    /// Look up a credential by token hash.
    pub fn ddns_credential_by_hash(&self, hash: &str) -> Result<Option<DdnsCredential>, DnsError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, zone_id, fqdn, ttl, enabled FROM ddns_credentials WHERE token_hash = ?1",
        )?;
        let cred = stmt
            .query_row(params![hash], |row| {
                Ok(DdnsCredential {
                    id: row.get(0)?,
                    zone_id: row.get(1)?,
                    fqdn: row.get(2)?,
                    ttl: row.get(3)?,
                    enabled: row.get(4)?,
                })
            })
            .optional()?;
        Ok(cred)
    }

    /// Replace the A-record for a credential's bound name in one
    /// transaction, append the audit row and bump the zone SOA serial.
    ///
    /// Returns the previous A value, if one existed.
    pub fn ddns_replace_a(
        &self,
        cred: &DdnsCredential,
        ip: Ipv4Addr,
        user_agent: Option<&str>,
    ) -> Result<Option<String>, DnsError> {
        let new_value = ip.to_string();
        let now = now_unix();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT value FROM records WHERE zone_id = ?1 AND fqdn = ?2 AND type = 'A'
                 ORDER BY id LIMIT 1",
                params![cred.zone_id, cred.fqdn],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "DELETE FROM records WHERE zone_id = ?1 AND fqdn = ?2 AND type = 'A'",
            params![cred.zone_id, cred.fqdn],
        )?;
        tx.execute(
            "INSERT INTO records (zone_id, fqdn, type, ttl, value) VALUES (?1, ?2, 'A', ?3, ?4)",
            params![cred.zone_id, cred.fqdn, cred.ttl, new_value],
        )?;

        bump_soa_serial(&tx, cred.zone_id, now)?;

        tx.execute(
            "INSERT INTO ddns_audit (credential_id, ip, previous_value, new_value, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![cred.id, new_value, previous, new_value, user_agent],
        )?;
        tx.commit()?;

        debug!(fqdn = %cred.fqdn, ip = %new_value, previous = ?previous, "ddns A-record replaced");
        Ok(previous)
    }

    /// Audit rows for a credential, oldest first.
    pub fn ddns_audit(&self, credential_id: i64) -> Result<Vec<AuditEntry>, DnsError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT ip, previous_value, new_value, user_agent FROM ddns_audit
             WHERE credential_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![credential_id], |row| {
                Ok(AuditEntry {
                    ip: row.get(0)?,
                    previous_value: row.get(1)?,
                    new_value: row.get(2)?,
                    user_agent: row.get(3)?,
                })
            })?
            .collect::<Result<_, _>>()?;
        Ok(rows)
    }
}

/// Increment the serial field of the zone's SOA row, if it has one.
fn bump_soa_serial(tx: &rusqlite::Transaction<'_>, zone_id: i64, now: i64) -> Result<(), DnsError> {
    let soa: Option<(i64, String)> = tx
        .query_row(
            "SELECT id, value FROM records WHERE zone_id = ?1 AND type = 'SOA' ORDER BY id LIMIT 1",
            params![zone_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((soa_id, value)) = soa else {
        return Ok(());
    };
    if let RecordData::Soa {
        mname,
        rname,
        serial,
        refresh,
        retry,
        expire,
        minimum,
    } = RecordData::parse(RecordType::Soa, &value)?
    {
        let bumped = RecordData::Soa {
            mname,
            rname,
            serial: serial.wrapping_add(1),
            refresh,
            retry,
            expire,
            minimum,
        };
        tx.execute(
            "UPDATE records SET value = ?2, updated_at = ?3 WHERE id = ?1",
            params![soa_id, bumped.to_value(), now],
        )?;
    }
    Ok(())
}

fn migrate(conn: &Connection) -> Result<(), DnsError> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
    }
    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        info!(from = version, to = SCHEMA_VERSION, "store schema migrated");
    }
    Ok(())
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

struct RawRecord {
    id: i64,
    zone_id: i64,
    fqdn: String,
    rtype: String,
    ttl: i64,
    value: String,
    weight: i64,
    geo_cidrs: String,
    enabled: bool,
    healthcheck_url: Option<String>,
    healthy: bool,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            zone_id: row.get(1)?,
            fqdn: row.get(2)?,
            rtype: row.get(3)?,
            ttl: row.get(4)?,
            value: row.get(5)?,
            weight: row.get(6)?,
            geo_cidrs: row.get(7)?,
            enabled: row.get(8)?,
            healthcheck_url: row.get(9)?,
            healthy: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<StoredRecord, DnsError> {
        let rtype: RecordType = self.rtype.parse()?;
        Ok(StoredRecord {
            id: self.id,
            zone_id: self.zone_id,
            fqdn: self.fqdn,
            rtype,
            ttl: self.ttl.clamp(0, u32::MAX as i64) as u32,
            data: RecordData::parse(rtype, &self.value)?,
            weight: self.weight.clamp(0, u32::MAX as i64) as u32,
            geo_cidrs: parse_geo_cidrs(&self.geo_cidrs)?,
            enabled: self.enabled,
            healthcheck_url: self.healthcheck_url,
            healthy: self.healthy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn seed_zone(store: &Store, name: &str) -> Zone {
        let zone = store.create_zone(name).unwrap();
        store
            .insert_record(&NewRecord::new(
                zone.id,
                &zone.apex(),
                RecordType::Soa,
                3600,
                "ns1.example.local. admin.example.local. 1 3600 600 604800 60",
            ))
            .unwrap();
        store
            .insert_record(&NewRecord::new(
                zone.id,
                &zone.apex(),
                RecordType::Ns,
                3600,
                "ns1.example.local.",
            ))
            .unwrap();
        zone
    }

    #[test]
    fn test_lookup_orders_cname_first() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        s.insert_record(&NewRecord::new(zone.id, "www.z.test.", RecordType::A, 60, "1.2.3.4"))
            .unwrap();
        s.insert_record(&NewRecord::new(
            zone.id,
            "www.z.test.",
            RecordType::Txt,
            60,
            "hello",
        ))
        .unwrap();
        s.insert_record(&NewRecord::new(
            zone.id,
            "www.z.test.",
            RecordType::Cname,
            60,
            "z.test.",
        ))
        .unwrap();

        let rows = s.lookup("www.z.test.").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].rtype, RecordType::Cname);
        assert_eq!(rows[1].rtype, RecordType::A);
        assert_eq!(rows[2].rtype, RecordType::Txt);
    }

    #[test]
    fn test_lookup_misses_other_names() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        s.insert_record(&NewRecord::new(zone.id, "www.z.test.", RecordType::A, 60, "1.2.3.4"))
            .unwrap();
        assert!(s.lookup("w.z.test.").unwrap().is_empty());
    }

    #[test]
    fn test_insert_canonicalises_fqdn() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        s.insert_record(&NewRecord::new(zone.id, "WWW.Z.Test", RecordType::A, 60, "1.2.3.4"))
            .unwrap();
        assert_eq!(s.lookup("www.z.test.").unwrap().len(), 1);
    }

    #[test]
    fn test_insert_rejects_bad_value() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        let result = s.insert_record(&NewRecord::new(
            zone.id,
            "www.z.test.",
            RecordType::A,
            60,
            "not-an-ip",
        ));
        assert!(matches!(result, Err(DnsError::InvalidRecord(_))));
    }

    #[test]
    fn test_insert_rejects_out_of_range_ttl_and_weight() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        let mut record = NewRecord::new(zone.id, "www.z.test.", RecordType::A, 0, "1.2.3.4");
        assert!(s.insert_record(&record).is_err());
        record.ttl = 86_401;
        assert!(s.insert_record(&record).is_err());
        record.ttl = 60;
        record.weight = 10_001;
        assert!(s.insert_record(&record).is_err());
    }

    #[test]
    fn test_duplicate_row_is_rejected() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        let record = NewRecord::new(zone.id, "www.z.test.", RecordType::A, 60, "1.2.3.4");
        s.insert_record(&record).unwrap();
        assert!(matches!(s.insert_record(&record), Err(DnsError::Store(_))));
    }

    #[test]
    fn test_resolve_zone_exact_and_suffix() {
        let s = store();
        let zone = seed_zone(&s, "example.local");
        assert_eq!(s.resolve_zone("example.local.").unwrap().unwrap().id, zone.id);
        assert_eq!(
            s.resolve_zone("deep.sub.example.local.").unwrap().unwrap().id,
            zone.id
        );
        assert!(s.resolve_zone("example.invalid.").unwrap().is_none());
    }

    #[test]
    fn test_resolve_zone_requires_label_boundary() {
        let s = store();
        seed_zone(&s, "evil.com");
        assert!(s.resolve_zone("xevil.com.").unwrap().is_none());
        assert!(s.resolve_zone("a.xevil.com.").unwrap().is_none());
        assert!(s.resolve_zone("a.evil.com.").unwrap().is_some());
    }

    #[test]
    fn test_resolve_zone_prefers_longest_suffix() {
        let s = store();
        seed_zone(&s, "example.local");
        let sub = seed_zone(&s, "sub.example.local");
        assert_eq!(
            s.resolve_zone("www.sub.example.local.").unwrap().unwrap().id,
            sub.id
        );
    }

    #[test]
    fn test_authority_orders_soa_first() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        let auth = s.authority(&zone).unwrap();
        assert_eq!(auth.len(), 2);
        assert_eq!(auth[0].rtype, RecordType::Soa);
        assert_eq!(auth[1].rtype, RecordType::Ns);
    }

    #[test]
    fn test_health_targets_filters_disabled_and_bare_rows() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        let mut probed = NewRecord::new(zone.id, "a.z.test.", RecordType::A, 60, "1.1.1.1");
        probed.healthcheck_url = Some("http://127.0.0.1:1/healthz");
        let probed_id = s.insert_record(&probed).unwrap();

        let mut disabled = NewRecord::new(zone.id, "b.z.test.", RecordType::A, 60, "2.2.2.2");
        disabled.healthcheck_url = Some("http://127.0.0.1:1/healthz");
        disabled.enabled = false;
        s.insert_record(&disabled).unwrap();

        s.insert_record(&NewRecord::new(zone.id, "c.z.test.", RecordType::A, 60, "3.3.3.3"))
            .unwrap();

        let targets = s.health_targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].record_id, probed_id);
    }

    #[test]
    fn test_update_health_round_trips() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        let mut record = NewRecord::new(zone.id, "a.z.test.", RecordType::A, 60, "1.1.1.1");
        record.healthcheck_url = Some("http://127.0.0.1:1/healthz");
        let id = s.insert_record(&record).unwrap();

        s.update_health(id, false, Some("status 503")).unwrap();
        let rows = s.lookup("a.z.test.").unwrap();
        assert!(!rows[0].healthy);

        s.update_health(id, true, None).unwrap();
        assert!(s.lookup("a.z.test.").unwrap()[0].healthy);
    }

    #[test]
    fn test_delete_zone_cascades() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        s.insert_record(&NewRecord::new(zone.id, "www.z.test.", RecordType::A, 60, "1.2.3.4"))
            .unwrap();
        s.create_ddns_credential(zone.id, "www.z.test.", "deadbeef", 60)
            .unwrap();

        s.delete_zone(zone.id).unwrap();
        assert!(s.lookup("www.z.test.").unwrap().is_empty());
        assert!(s.resolve_zone("z.test.").unwrap().is_none());
        assert!(s.ddns_credential_by_hash("deadbeef").unwrap().is_none());
    }

    #[test]
    fn test_ddns_replace_reports_previous_value() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        s.create_ddns_credential(zone.id, "home.z.test.", "hash1", 60)
            .unwrap();
        let cred = s.ddns_credential_by_hash("hash1").unwrap().unwrap();

        let prev = s
            .ddns_replace_a(&cred, Ipv4Addr::new(5, 6, 7, 8), Some("test-agent"))
            .unwrap();
        assert_eq!(prev, None);

        let rows = s.lookup("home.z.test.").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ttl, 60);

        let prev = s
            .ddns_replace_a(&cred, Ipv4Addr::new(9, 9, 9, 9), None)
            .unwrap();
        assert_eq!(prev.as_deref(), Some("5.6.7.8"));
        assert_eq!(s.lookup("home.z.test.").unwrap().len(), 1);

        let audit = s.ddns_audit(cred.id).unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].previous_value, None);
        assert_eq!(audit[0].new_value, "5.6.7.8");
        assert_eq!(audit[0].user_agent.as_deref(), Some("test-agent"));
        assert_eq!(audit[1].previous_value.as_deref(), Some("5.6.7.8"));
    }

    #[test]
    fn test_ddns_replace_bumps_soa_serial() {
        let s = store();
        let zone = seed_zone(&s, "z.test");
        s.create_ddns_credential(zone.id, "home.z.test.", "hash1", 60)
            .unwrap();
        let cred = s.ddns_credential_by_hash("hash1").unwrap().unwrap();
        s.ddns_replace_a(&cred, Ipv4Addr::new(5, 6, 7, 8), None)
            .unwrap();

        let auth = s.authority(&zone).unwrap();
        match &auth[0].data {
            RecordData::Soa { serial, .. } => assert_eq!(*serial, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let dir = std::env::temp_dir().join(format!("tiller-dns-test-{}", std::process::id()));
        let path = dir.join("store.sqlite");
        {
            let s = Store::open(&path).unwrap();
            seed_zone(&s, "z.test");
        }
        let s = Store::open(&path).unwrap();
        assert!(s.resolve_zone("z.test.").unwrap().is_some());
        let _ = std::fs::remove_dir_all(dir);
    }
}
