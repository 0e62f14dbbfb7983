//! Per-query answer selection: geo targeting, liveness filtering and
//! weighted load splitting over the stored rows for a name.
//!
//! The row lists arriving here are already ordered CNAME first, then id
//! ascending within each type, which keeps seeded runs reproducible.

use crate::record::{RecordType, StoredRecord, QTYPE_ANY};
use rand::Rng;
use std::net::IpAddr;

/// Choose the answer set for one query.
///
/// `qtype` is the raw wire value so ANY and unsupported types flow through
/// the same path. An unsupported qtype yields an empty set, which the server
/// turns into an empty NOERROR when the zone exists.
pub fn select(
    rows: &[StoredRecord],
    qtype: u16,
    client_ip: Option<IpAddr>,
    rng: &mut impl Rng,
) -> Vec<StoredRecord> {
    let enabled: Vec<&StoredRecord> = rows.iter().filter(|r| r.enabled).collect();
    if enabled.is_empty() {
        return Vec::new();
    }

    if qtype == QTYPE_ANY {
        let mut out = Vec::new();
        for rtype in RecordType::ALL {
            let group: Vec<&StoredRecord> =
                enabled.iter().copied().filter(|r| r.rtype == rtype).collect();
            if group.is_empty() {
                continue;
            }
            if rtype.is_address_like() {
                if let Some(row) = pick_one(&group, client_ip, rng) {
                    out.push(row.clone());
                }
            } else {
                out.extend(group.into_iter().cloned());
            }
        }
        return out;
    }

    let Some(rtype) = RecordType::from_u16(qtype) else {
        return Vec::new();
    };

    if rtype.is_address_like() {
        // a CNAME shadows every other type at the same name
        let cnames: Vec<&StoredRecord> = enabled
            .iter()
            .copied()
            .filter(|r| r.rtype == RecordType::Cname)
            .collect();
        let pool = if !cnames.is_empty() {
            cnames
        } else {
            enabled
                .iter()
                .copied()
                .filter(|r| r.rtype == rtype)
                .collect()
        };
        return pick_one(&pool, client_ip, rng)
            .map(|row| vec![row.clone()])
            .unwrap_or_default();
    }

    enabled
        .into_iter()
        .filter(|r| r.rtype == rtype)
        .cloned()
        .collect()
}

/// Geo filter, then health filter, then a weighted draw.
fn pick_one<'a>(
    pool: &[&'a StoredRecord],
    client_ip: Option<IpAddr>,
    rng: &mut impl Rng,
) -> Option<&'a StoredRecord> {
    if pool.is_empty() {
        return None;
    }
    let pool = geo_filter(pool, client_ip);
    let pool = health_filter(&pool);
    weighted_pick(&pool, rng)
}

/// Prefer rows targeted at the client's subnet, fall back to untargeted
/// rows, and keep the whole pool when neither partition matches.
fn geo_filter<'a>(pool: &[&'a StoredRecord], client_ip: Option<IpAddr>) -> Vec<&'a StoredRecord> {
    let Some(ip) = client_ip else {
        return pool.to_vec();
    };
    let mut targeted = Vec::new();
    let mut untargeted = Vec::new();
    for &row in pool {
        if row.geo_cidrs.is_empty() {
            untargeted.push(row);
        } else if row.geo_cidrs.iter().any(|net| net.contains(&ip)) {
            targeted.push(row);
        }
    }
    if !targeted.is_empty() {
        targeted
    } else if !untargeted.is_empty() {
        untargeted
    } else {
        pool.to_vec()
    }
}

/// Drop rows whose last probe failed; fail open when that would drop all.
fn health_filter<'a>(pool: &[&'a StoredRecord]) -> Vec<&'a StoredRecord> {
    let alive: Vec<&StoredRecord> = pool
        .iter()
        .copied()
        .filter(|r| r.healthy || r.healthcheck_url.as_deref().unwrap_or("").is_empty())
        .collect();
    if alive.is_empty() {
        pool.to_vec()
    } else {
        alive
    }
}

/// Draw uniformly in `[0, total_weight)` and walk cumulative ranges.
fn weighted_pick<'a>(pool: &[&'a StoredRecord], rng: &mut impl Rng) -> Option<&'a StoredRecord> {
    if pool.is_empty() {
        return None;
    }
    let total: u64 = pool.iter().map(|r| r.weight as u64).sum();
    if total == 0 {
        return Some(pool[rng.gen_range(0..pool.len())]);
    }
    let mut draw = rng.gen_range(0..total);
    for &row in pool {
        let w = row.weight as u64;
        if draw < w {
            return Some(row);
        }
        draw -= w;
    }
    pool.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{parse_geo_cidrs, RecordData};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    fn a_row(id: i64, ip: [u8; 4]) -> StoredRecord {
        StoredRecord {
            id,
            zone_id: 1,
            fqdn: "app.z.".into(),
            rtype: RecordType::A,
            ttl: 60,
            data: RecordData::A(Ipv4Addr::from(ip)),
            weight: 100,
            geo_cidrs: Vec::new(),
            enabled: true,
            healthcheck_url: None,
            healthy: true,
        }
    }

    fn cname_row(id: i64, target: &str) -> StoredRecord {
        StoredRecord {
            rtype: RecordType::Cname,
            data: RecordData::Cname(target.into()),
            ..a_row(id, [0, 0, 0, 0])
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_disabled_rows_are_invisible() {
        let mut row = a_row(1, [1, 1, 1, 1]);
        row.enabled = false;
        assert!(select(&[row], 1, None, &mut rng()).is_empty());
    }

    #[test]
    fn test_single_answer_for_address_types() {
        let rows = vec![a_row(1, [1, 1, 1, 1]), a_row(2, [2, 2, 2, 2])];
        for _ in 0..50 {
            let picked = select(&rows, 1, None, &mut rng());
            assert_eq!(picked.len(), 1);
            assert_eq!(picked[0].rtype, RecordType::A);
        }
    }

    #[test]
    fn test_selection_is_closed_over_input() {
        let rows = vec![a_row(1, [1, 1, 1, 1]), a_row(7, [2, 2, 2, 2])];
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut rng = rng();
        for _ in 0..100 {
            for picked in select(&rows, 1, None, &mut rng) {
                assert!(ids.contains(&picked.id));
            }
        }
    }

    #[test]
    fn test_cname_shadows_a() {
        let rows = vec![cname_row(1, "other.z."), a_row(2, [1, 1, 1, 1])];
        let picked = select(&rows, 1, None, &mut rng());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].rtype, RecordType::Cname);

        // AAAA query hits the same CNAME
        let picked = select(&rows, 28, None, &mut rng());
        assert_eq!(picked[0].rtype, RecordType::Cname);
    }

    #[test]
    fn test_multi_valued_types_return_all() {
        let mk = |id, pref| StoredRecord {
            rtype: RecordType::Mx,
            data: RecordData::Mx {
                preference: pref,
                exchange: "mail.z.".into(),
            },
            ..a_row(id, [0, 0, 0, 0])
        };
        let rows = vec![mk(1, 10), mk(2, 20)];
        let picked = select(&rows, 15, None, &mut rng());
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_unsupported_qtype_yields_empty() {
        let rows = vec![a_row(1, [1, 1, 1, 1])];
        assert!(select(&rows, 99, None, &mut rng()).is_empty());
    }

    #[test]
    fn test_any_groups_by_type() {
        let txt = StoredRecord {
            rtype: RecordType::Txt,
            data: RecordData::Txt(b"hello".to_vec()),
            ..a_row(3, [0, 0, 0, 0])
        };
        let rows = vec![a_row(1, [1, 1, 1, 1]), a_row(2, [2, 2, 2, 2]), txt];
        let picked = select(&rows, QTYPE_ANY, None, &mut rng());
        let a_count = picked.iter().filter(|r| r.rtype == RecordType::A).count();
        let txt_count = picked.iter().filter(|r| r.rtype == RecordType::Txt).count();
        assert_eq!(a_count, 1);
        assert_eq!(txt_count, 1);
    }

    #[test]
    fn test_geo_match_is_strict() {
        let mut near = a_row(1, [1, 1, 1, 1]);
        near.geo_cidrs = parse_geo_cidrs("10.0.0.0/24").unwrap();
        let far = a_row(2, [2, 2, 2, 2]);
        let rows = vec![near, far];

        let inside: IpAddr = "10.0.0.5".parse().unwrap();
        let outside: IpAddr = "10.0.1.5".parse().unwrap();
        let mut rng = rng();
        for _ in 0..50 {
            assert_eq!(select(&rows, 1, Some(inside), &mut rng)[0].id, 1);
            assert_eq!(select(&rows, 1, Some(outside), &mut rng)[0].id, 2);
        }
    }

    #[test]
    fn test_geo_keeps_pool_when_nothing_matches() {
        let mut only = a_row(1, [1, 1, 1, 1]);
        only.geo_cidrs = parse_geo_cidrs("10.0.0.0/24").unwrap();
        let rows = vec![only];
        let outside: IpAddr = "192.0.2.5".parse().unwrap();
        assert_eq!(select(&rows, 1, Some(outside), &mut rng()).len(), 1);
    }

    #[test]
    fn test_unhealthy_rows_are_skipped() {
        let mut sick = a_row(1, [1, 1, 1, 1]);
        sick.healthcheck_url = Some("http://probe/1".into());
        sick.healthy = false;
        let well = a_row(2, [2, 2, 2, 2]);
        let rows = vec![sick, well];
        let mut rng = rng();
        for _ in 0..50 {
            assert_eq!(select(&rows, 1, None, &mut rng)[0].id, 2);
        }
    }

    #[test]
    fn test_health_filter_fails_open() {
        let mut sick = a_row(1, [1, 1, 1, 1]);
        sick.healthcheck_url = Some("http://probe/1".into());
        sick.healthy = false;
        let rows = vec![sick];
        assert_eq!(select(&rows, 1, None, &mut rng()).len(), 1);
    }

    #[test]
    fn test_unhealthy_without_probe_url_still_serves() {
        let mut row = a_row(1, [1, 1, 1, 1]);
        row.healthy = false;
        assert_eq!(select(&[row], 1, None, &mut rng()).len(), 1);
    }

    #[test]
    fn test_weighted_distribution_converges() {
        let mut sixty = a_row(1, [1, 1, 1, 1]);
        sixty.weight = 60;
        let mut forty = a_row(2, [2, 2, 2, 2]);
        forty.weight = 40;
        let rows = vec![sixty, forty];

        let mut rng = rng();
        let mut counts: HashMap<i64, u32> = HashMap::new();
        for _ in 0..10_000 {
            let picked = select(&rows, 1, None, &mut rng);
            *counts.entry(picked[0].id).or_default() += 1;
        }
        let freq1 = counts[&1] as f64 / 10_000.0;
        let freq2 = counts[&2] as f64 / 10_000.0;
        assert!((0.58..=0.62).contains(&freq1), "got {freq1}");
        assert!((0.38..=0.42).contains(&freq2), "got {freq2}");
    }

    #[test]
    fn test_all_zero_weights_pick_uniformly() {
        let mut one = a_row(1, [1, 1, 1, 1]);
        one.weight = 0;
        let mut two = a_row(2, [2, 2, 2, 2]);
        two.weight = 0;
        let rows = vec![one, two];

        let mut rng = rng();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(select(&rows, 1, None, &mut rng)[0].id);
        }
        assert_eq!(seen.len(), 2);
    }
}
