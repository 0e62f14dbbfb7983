//! RFC 1035 wire format: query parsing and response synthesis.
//!
//! Pure functions over byte slices, no I/O and no allocation beyond the
//! output buffers. [`parse_query`] returns `None` for anything malformed;
//! the caller drops such datagrams without replying. Responses are built
//! without name compression (answers here are small enough to fit 512
//! bytes without it).

use crate::error::DnsError;
use crate::record::{RecordData, RecordType};

/// Shortest possible DNS message: the 12-byte header.
const HEADER_LEN: usize = 12;

/// Upper bound on label reads plus compression jumps while decoding one name.
const MAX_NAME_HOPS: usize = 200;

/// Longest legal domain name in wire octets.
const MAX_NAME_LEN: usize = 255;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;

/// Response codes this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    /// No error condition.
    NoError = 0,
    /// Internal failure while building the response.
    ServFail = 2,
    /// The queried name falls under no zone we are authoritative for.
    NxDomain = 3,
    /// Unsupported query class.
    NotImp = 4,
    /// Source is rate limited.
    Refused = 5,
}

/// A parsed query, carrying everything response synthesis needs.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Transaction id, echoed in the reply.
    pub id: u16,
    /// Raw header flags from the query.
    pub flags: u16,
    /// Requested record type (wire value; may be ANY or something unsupported).
    pub qtype: u16,
    /// Requested class.
    pub qclass: u16,
    /// Decoded query name, lower-case with trailing dot.
    pub qname: String,
    /// Raw question-section bytes, echoed verbatim in the reply.
    pub question: Vec<u8>,
}

/// One resource record headed for the answer or authority section.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Owner name, canonical form.
    pub name: String,
    /// Record type.
    pub rtype: RecordType,
    /// TTL in seconds.
    pub ttl: u32,
    /// Typed rdata.
    pub data: RecordData,
}

/// Parse a datagram into a query context.
///
/// Returns `None` when the packet must be dropped silently: short packets,
/// responses, multi-question messages, malformed or out-of-bounds names.
pub fn parse_query(buf: &[u8]) -> Option<QueryContext> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let id = u16::from_be_bytes([buf[0], buf[1]]);
    let flags = u16::from_be_bytes([buf[2], buf[3]]);
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]);
    if flags & FLAG_QR != 0 || qdcount != 1 {
        return None;
    }

    let (qname, name_end) = decode_name(buf, HEADER_LEN)?;
    let question_end = name_end.checked_add(4)?;
    if question_end > buf.len() {
        return None;
    }
    let qtype = u16::from_be_bytes([buf[name_end], buf[name_end + 1]]);
    let qclass = u16::from_be_bytes([buf[name_end + 2], buf[name_end + 3]]);

    Some(QueryContext {
        id,
        flags,
        qtype,
        qclass,
        qname,
        question: buf[HEADER_LEN..question_end].to_vec(),
    })
}

/// Decode a possibly-compressed name starting at `start`.
///
/// Returns the canonical name and the offset just past the name in the
/// original (unjumped) byte stream.
fn decode_name(buf: &[u8], start: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut pos = start;
    let mut end = 0usize;
    let mut jumped = false;
    let mut hops = 0usize;
    let mut wire_len = 0usize;

    loop {
        hops += 1;
        if hops > MAX_NAME_HOPS {
            return None;
        }
        let len = *buf.get(pos)?;
        if len & 0xC0 == 0xC0 {
            let low = *buf.get(pos + 1)?;
            let target = (((len & 0x3F) as usize) << 8) | low as usize;
            if target >= buf.len() {
                return None;
            }
            if !jumped {
                end = pos + 2;
                jumped = true;
            }
            pos = target;
        } else if len & 0xC0 != 0 {
            // 0x40/0x80 label types were never standardized
            return None;
        } else if len == 0 {
            if !jumped {
                end = pos + 1;
            }
            break;
        } else {
            let len = len as usize;
            let label = buf.get(pos + 1..pos + 1 + len)?;
            wire_len += len + 1;
            if wire_len > MAX_NAME_LEN {
                return None;
            }
            for &b in label {
                name.push((b as char).to_ascii_lowercase());
            }
            name.push('.');
            pos += 1 + len;
        }
    }

    if name.is_empty() {
        name.push('.');
    }
    Some((name, end))
}

/// Encode a canonical name into uncompressed label form.
fn encode_name(name: &str, out: &mut Vec<u8>) -> Result<(), DnsError> {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() {
        out.push(0);
        return Ok(());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(DnsError::Encode(format!("name too long: {name:?}")));
    }
    for label in trimmed.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(DnsError::Encode(format!("bad label in {name:?}")));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Ok(())
}

/// Encode rdata for one record, without the rdlength prefix.
fn encode_rdata(data: &RecordData, out: &mut Vec<u8>) -> Result<(), DnsError> {
    match data {
        RecordData::A(addr) => out.extend_from_slice(&addr.octets()),
        RecordData::Aaaa(addr) => out.extend_from_slice(&addr.octets()),
        RecordData::Cname(name) | RecordData::Ns(name) | RecordData::Ptr(name) => {
            encode_name(name, out)?;
        }
        RecordData::Soa {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } => {
            encode_name(mname, out)?;
            encode_name(rname, out)?;
            for field in [serial, refresh, retry, expire, minimum] {
                out.extend_from_slice(&field.to_be_bytes());
            }
        }
        RecordData::Mx {
            preference,
            exchange,
        } => {
            out.extend_from_slice(&preference.to_be_bytes());
            encode_name(exchange, out)?;
        }
        RecordData::Txt(bytes) => {
            if bytes.is_empty() {
                out.push(0);
            } else {
                for chunk in bytes.chunks(255) {
                    out.push(chunk.len() as u8);
                    out.extend_from_slice(chunk);
                }
            }
        }
        RecordData::Caa { flags, tag, value } => {
            if tag.is_empty() || tag.len() > 255 {
                return Err(DnsError::Encode("CAA tag length out of range".into()));
            }
            out.push(*flags);
            out.push(tag.len() as u8);
            out.extend_from_slice(tag.as_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        RecordData::Srv {
            priority,
            weight,
            port,
            target,
        } => {
            out.extend_from_slice(&priority.to_be_bytes());
            out.extend_from_slice(&weight.to_be_bytes());
            out.extend_from_slice(&port.to_be_bytes());
            encode_name(target, out)?;
        }
    }
    Ok(())
}

fn encode_record(answer: &Answer, out: &mut Vec<u8>) -> Result<(), DnsError> {
    encode_name(&answer.name, out)?;
    out.extend_from_slice(&answer.rtype.to_u16().to_be_bytes());
    out.extend_from_slice(&crate::record::CLASS_IN.to_be_bytes());
    out.extend_from_slice(&answer.ttl.to_be_bytes());

    let rdlength_at = out.len();
    out.extend_from_slice(&[0, 0]);
    encode_rdata(&answer.data, out)?;
    let rdlength = out.len() - rdlength_at - 2;
    if rdlength > u16::MAX as usize {
        return Err(DnsError::Encode("rdata too long".into()));
    }
    out[rdlength_at..rdlength_at + 2].copy_from_slice(&(rdlength as u16).to_be_bytes());
    Ok(())
}

fn response_header(ctx: &QueryContext, rcode: Rcode, ancount: u16, nscount: u16) -> [u8; 12] {
    let flags = FLAG_QR | FLAG_AA | (ctx.flags & FLAG_RD) | rcode as u16;
    let mut header = [0u8; 12];
    header[0..2].copy_from_slice(&ctx.id.to_be_bytes());
    header[2..4].copy_from_slice(&flags.to_be_bytes());
    header[4..6].copy_from_slice(&1u16.to_be_bytes());
    header[6..8].copy_from_slice(&ancount.to_be_bytes());
    header[8..10].copy_from_slice(&nscount.to_be_bytes());
    header
}

/// Build a full response: header, echoed question, answers, authority.
///
/// `zone_exists` selects NOERROR versus NXDOMAIN. Callers pass authority
/// records only when the answer section is empty.
pub fn build_response(
    ctx: &QueryContext,
    answers: &[Answer],
    authority: &[Answer],
    zone_exists: bool,
) -> Result<Vec<u8>, DnsError> {
    if answers.len() > u16::MAX as usize || authority.len() > u16::MAX as usize {
        return Err(DnsError::Encode("too many records".into()));
    }
    let rcode = if zone_exists {
        Rcode::NoError
    } else {
        Rcode::NxDomain
    };

    let mut out = Vec::with_capacity(HEADER_LEN + ctx.question.len() + 64 * answers.len());
    out.extend_from_slice(&response_header(
        ctx,
        rcode,
        answers.len() as u16,
        authority.len() as u16,
    ));
    out.extend_from_slice(&ctx.question);
    for answer in answers.iter().chain(authority) {
        encode_record(answer, &mut out)?;
    }
    Ok(out)
}

/// Build an answerless reply carrying only an error rcode.
///
/// Used for REFUSED, NOTIMP and SERVFAIL, all of which echo the request id
/// and question but no records.
pub fn build_rejection(ctx: &QueryContext, rcode: Rcode) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + ctx.question.len());
    out.extend_from_slice(&response_header(ctx, rcode, 0, 0));
    out.extend_from_slice(&ctx.question);
    out
}
