//! Record model: the closed set of supported record types and the typed
//! record data union.
//!
//! Record values are stored as text in the type-specific grammar the control
//! plane writes (e.g. `10 mail.example.com.` for MX). They are parsed into
//! [`RecordData`] eagerly, both at ingest and when rows are read back, so the
//! wire encoder never sees raw text.

use crate::error::DnsError;
use ipnet::IpNet;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Wire value of the IN class.
pub const CLASS_IN: u16 = 1;

/// Wire value of the ANY qtype. Not a storable record type.
pub const QTYPE_ANY: u16 = 255;

/// Record types this server stores and serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// IPv4 host address.
    A,
    /// IPv6 host address.
    Aaaa,
    /// Canonical name alias.
    Cname,
    /// Authoritative nameserver.
    Ns,
    /// Start of authority.
    Soa,
    /// Mail exchange.
    Mx,
    /// Free-form text.
    Txt,
    /// Certification authority authorization.
    Caa,
    /// Service locator.
    Srv,
    /// Reverse pointer.
    Ptr,
}

impl RecordType {
    /// All supported types, in wire-value order.
    pub const ALL: [RecordType; 10] = [
        RecordType::A,
        RecordType::Ns,
        RecordType::Cname,
        RecordType::Soa,
        RecordType::Ptr,
        RecordType::Mx,
        RecordType::Txt,
        RecordType::Aaaa,
        RecordType::Srv,
        RecordType::Caa,
    ];

    /// Canonical upper-case mnemonic, as stored in the `records.type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Ns => "NS",
            RecordType::Soa => "SOA",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Caa => "CAA",
            RecordType::Srv => "SRV",
            RecordType::Ptr => "PTR",
        }
    }

    /// RFC 1035 TYPE value.
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Caa => 257,
        }
    }

    /// Map a wire TYPE value back to a supported record type.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(RecordType::A),
            2 => Some(RecordType::Ns),
            5 => Some(RecordType::Cname),
            6 => Some(RecordType::Soa),
            12 => Some(RecordType::Ptr),
            15 => Some(RecordType::Mx),
            16 => Some(RecordType::Txt),
            28 => Some(RecordType::Aaaa),
            33 => Some(RecordType::Srv),
            257 => Some(RecordType::Caa),
            _ => None,
        }
    }

    /// True for the types subject to single-answer weighted selection.
    pub fn is_address_like(&self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa | RecordType::Cname)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "NS" => Ok(RecordType::Ns),
            "SOA" => Ok(RecordType::Soa),
            "MX" => Ok(RecordType::Mx),
            "TXT" => Ok(RecordType::Txt),
            "CAA" => Ok(RecordType::Caa),
            "SRV" => Ok(RecordType::Srv),
            "PTR" => Ok(RecordType::Ptr),
            other => Err(DnsError::InvalidRecord(format!(
                "unsupported record type {other:?}"
            ))),
        }
    }
}

/// Lower-case a name and make sure it carries a trailing dot.
pub fn canonical_name(name: &str) -> String {
    let mut out = name.trim().to_ascii_lowercase();
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

/// Typed record data, parsed from the textual value grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    /// Four-octet IPv4 address.
    A(Ipv4Addr),
    /// Sixteen-octet IPv6 address.
    Aaaa(Ipv6Addr),
    /// Alias target.
    Cname(String),
    /// Nameserver host.
    Ns(String),
    /// Reverse pointer target.
    Ptr(String),
    /// Zone authority parameters.
    Soa {
        /// Primary nameserver host.
        mname: String,
        /// Responsible-party mailbox in name form.
        rname: String,
        /// Zone version, bumped on mutation.
        serial: u32,
        /// Secondary refresh interval, seconds.
        refresh: u32,
        /// Secondary retry interval, seconds.
        retry: u32,
        /// Secondary expiry, seconds.
        expire: u32,
        /// Negative-caching TTL, seconds.
        minimum: u32,
    },
    /// Mail exchange host with preference.
    Mx {
        /// Lower is preferred.
        preference: u16,
        /// Exchange host.
        exchange: String,
    },
    /// Opaque text, chunked on the wire.
    Txt(Vec<u8>),
    /// CA authorization property.
    Caa {
        /// Critical flag octet.
        flags: u8,
        /// Property tag (e.g. `issue`).
        tag: String,
        /// Property value.
        value: String,
    },
    /// Service locator target.
    Srv {
        /// Lower is contacted first.
        priority: u16,
        /// Relative weight among equal priorities.
        weight: u16,
        /// Service port.
        port: u16,
        /// Target host.
        target: String,
    },
}

fn parse_u32(field: &str, s: &str) -> Result<u32, DnsError> {
    s.parse()
        .map_err(|_| DnsError::InvalidRecord(format!("{field}: expected a number, got {s:?}")))
}

fn parse_u16(field: &str, s: &str) -> Result<u16, DnsError> {
    s.parse()
        .map_err(|_| DnsError::InvalidRecord(format!("{field}: expected a number, got {s:?}")))
}

impl RecordData {
    /// Parse a textual record value according to the grammar for `rtype`.
    pub fn parse(rtype: RecordType, value: &str) -> Result<Self, DnsError> {
        let value = value.trim();
        match rtype {
            RecordType::A => {
                let addr: Ipv4Addr = value.parse().map_err(|_| {
                    DnsError::InvalidRecord(format!("A: not an IPv4 address: {value:?}"))
                })?;
                Ok(RecordData::A(addr))
            }
            RecordType::Aaaa => {
                let addr: Ipv6Addr = value.parse().map_err(|_| {
                    DnsError::InvalidRecord(format!("AAAA: not an IPv6 address: {value:?}"))
                })?;
                Ok(RecordData::Aaaa(addr))
            }
            RecordType::Cname => Ok(RecordData::Cname(parse_fqdn("CNAME", value)?)),
            RecordType::Ns => Ok(RecordData::Ns(parse_fqdn("NS", value)?)),
            RecordType::Ptr => Ok(RecordData::Ptr(parse_fqdn("PTR", value)?)),
            RecordType::Soa => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() != 7 {
                    return Err(DnsError::InvalidRecord(format!(
                        "SOA: expected 7 fields, got {}",
                        parts.len()
                    )));
                }
                Ok(RecordData::Soa {
                    mname: parse_fqdn("SOA mname", parts[0])?,
                    rname: parse_fqdn("SOA rname", parts[1])?,
                    serial: parse_u32("SOA serial", parts[2])?,
                    refresh: parse_u32("SOA refresh", parts[3])?,
                    retry: parse_u32("SOA retry", parts[4])?,
                    expire: parse_u32("SOA expire", parts[5])?,
                    minimum: parse_u32("SOA minimum", parts[6])?,
                })
            }
            RecordType::Mx => {
                let (pref, exchange) = value.split_once(char::is_whitespace).ok_or_else(|| {
                    DnsError::InvalidRecord("MX: expected \"preference exchange\"".into())
                })?;
                Ok(RecordData::Mx {
                    preference: parse_u16("MX preference", pref)?,
                    exchange: parse_fqdn("MX exchange", exchange.trim())?,
                })
            }
            RecordType::Txt => Ok(RecordData::Txt(value.as_bytes().to_vec())),
            RecordType::Caa => {
                let mut parts = value.splitn(3, char::is_whitespace);
                let flags = parts.next().unwrap_or_default();
                let tag = parts.next().ok_or_else(|| {
                    DnsError::InvalidRecord("CAA: expected \"flags tag value\"".into())
                })?;
                let caa_value = parts.next().unwrap_or("");
                let flags: u8 = flags.parse().map_err(|_| {
                    DnsError::InvalidRecord(format!("CAA flags: expected a number, got {flags:?}"))
                })?;
                if tag.is_empty() || tag.len() > 255 {
                    return Err(DnsError::InvalidRecord("CAA: bad tag length".into()));
                }
                Ok(RecordData::Caa {
                    flags,
                    tag: tag.to_string(),
                    value: caa_value.trim_matches('"').to_string(),
                })
            }
            RecordType::Srv => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() != 4 {
                    return Err(DnsError::InvalidRecord(format!(
                        "SRV: expected 4 fields, got {}",
                        parts.len()
                    )));
                }
                Ok(RecordData::Srv {
                    priority: parse_u16("SRV priority", parts[0])?,
                    weight: parse_u16("SRV weight", parts[1])?,
                    port: parse_u16("SRV port", parts[2])?,
                    target: parse_fqdn("SRV target", parts[3])?,
                })
            }
        }
    }

    /// The record type this data belongs to.
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::Aaaa,
            RecordData::Cname(_) => RecordType::Cname,
            RecordData::Ns(_) => RecordType::Ns,
            RecordData::Ptr(_) => RecordType::Ptr,
            RecordData::Soa { .. } => RecordType::Soa,
            RecordData::Mx { .. } => RecordType::Mx,
            RecordData::Txt(_) => RecordType::Txt,
            RecordData::Caa { .. } => RecordType::Caa,
            RecordData::Srv { .. } => RecordType::Srv,
        }
    }

    /// Render back to the textual value grammar.
    pub fn to_value(&self) -> String {
        match self {
            RecordData::A(addr) => addr.to_string(),
            RecordData::Aaaa(addr) => addr.to_string(),
            RecordData::Cname(name) | RecordData::Ns(name) | RecordData::Ptr(name) => name.clone(),
            RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => format!("{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}"),
            RecordData::Mx {
                preference,
                exchange,
            } => format!("{preference} {exchange}"),
            RecordData::Txt(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            RecordData::Caa { flags, tag, value } => format!("{flags} {tag} {value}"),
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => format!("{priority} {weight} {port} {target}"),
        }
    }
}

fn parse_fqdn(field: &str, value: &str) -> Result<String, DnsError> {
    if value.is_empty() {
        return Err(DnsError::InvalidRecord(format!("{field}: empty name")));
    }
    let name = canonical_name(value);
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(DnsError::InvalidRecord(format!(
                "{field}: bad label in {value:?}"
            )));
        }
    }
    if name.len() > 255 {
        return Err(DnsError::InvalidRecord(format!("{field}: name too long")));
    }
    Ok(name)
}

/// Parse the comma-separated CIDR list stored in `records.geo_cidrs`.
pub fn parse_geo_cidrs(raw: &str) -> Result<Vec<IpNet>, DnsError> {
    let mut nets = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let net: IpNet = part
            .parse()
            .map_err(|_| DnsError::InvalidRecord(format!("bad CIDR {part:?}")))?;
        nets.push(net);
    }
    Ok(nets)
}

/// One row of the `records` table with its value parsed.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// Row id; selection order within a type group follows it.
    pub id: i64,
    /// Owning zone row.
    pub zone_id: i64,
    /// Canonical owner name (lower-case, trailing dot).
    pub fqdn: String,
    /// Record type.
    pub rtype: RecordType,
    /// TTL served on the wire, seconds.
    pub ttl: u32,
    /// Parsed record data.
    pub data: RecordData,
    /// Relative weight for single-answer selection.
    pub weight: u32,
    /// Client subnets this row is targeted at; empty means untargeted.
    pub geo_cidrs: Vec<IpNet>,
    /// Disabled rows are invisible to resolution.
    pub enabled: bool,
    /// Probe URL; `None` means the row is always considered healthy.
    pub healthcheck_url: Option<String>,
    /// Last probe outcome; only meaningful with a probe URL.
    pub healthy: bool,
}
