// DNS zone and node enumeration via LDAP

use crate::acl::structures::{
    sd_flags_control, DACL_SECURITY_INFORMATION, GROUP_SECURITY_INFORMATION,
    OWNER_SECURITY_INFORMATION,
};
use crate::acl::{LdapSid, SecurityDescriptor};
use crate::debug::debug_log;
use crate::dns::record::{get_record_type_name, DnsRecord};
use crate::ldap::escape_filter;
use ldap3::{LdapConn, Scope, SearchEntry};
use std::net::Ipv4Addr;

const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";
const PAGE_SIZE: i32 = 500;

/// One dnsZone object: the zone name plus the container DN its nodes
/// hang under.
#[derive(Debug, Clone)]
pub struct ZoneRef {
    pub name: String,
    pub dn: String,
}

/// One dnsNode object with its parsed record blobs and owner SID.
#[derive(Debug, Clone)]
pub struct DnsNode {
    pub name: String,
    pub dn: String,
    pub records: Vec<DnsRecord>,
    pub tombstoned: bool,
    pub owner: Option<LdapSid>,
}

pub fn query_dns_zones(
    ldap: &mut LdapConn,
    search_base: &str,
    forest: bool,
) -> Result<Vec<ZoneRef>, Box<dyn std::error::Error>> {
    debug_log(2, format!("Querying DNS zones (forest={})", forest));

    let dnsroot = partition_root(ldap, search_base, forest)?;
    let filter = "(objectClass=dnsZone)";

    debug_log(3, format!("DNS root DN: {}", dnsroot));

    let (results, _) = ldap
        .search(&dnsroot, Scope::OneLevel, filter, vec!["dc"])?
        .success()?;

    debug_log(2, format!("Found {} DNS zones", results.len()));

    let mut zones = Vec::new();
    for entry in results {
        let search_entry = SearchEntry::construct(entry);
        if let Some(zone_name) = search_entry.attrs.get("dc").and_then(|v| v.first()) {
            zones.push(ZoneRef {
                name: zone_name.clone(),
                dn: search_entry.dn.clone(),
            });
        }
    }

    Ok(zones)
}

/// Locate a zone by name, checking the domain partition first and falling
/// back to the forest partition.
pub fn find_zone(
    ldap: &mut LdapConn,
    search_base: &str,
    zone: &str,
) -> Result<ZoneRef, Box<dyn std::error::Error>> {
    for forest in [false, true] {
        let dnsroot = partition_root(ldap, search_base, forest)?;
        let filter = format!("(&(objectClass=dnsZone)(dc={}))", escape_filter(zone));

        let (results, _) = ldap
            .search(&dnsroot, Scope::OneLevel, &filter, vec!["dc"])?
            .success()?;

        if let Some(entry) = results.first() {
            let search_entry = SearchEntry::construct(entry.clone());
            debug_log(2, format!("Zone {} found at {}", zone, search_entry.dn));
            return Ok(ZoneRef {
                name: zone.to_string(),
                dn: search_entry.dn,
            });
        }
    }

    Err(format!(
        "Zone {} not found in DomainDnsZones or ForestDnsZones",
        zone
    )
    .into())
}

fn partition_root(
    ldap: &mut LdapConn,
    search_base: &str,
    forest: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    if forest {
        let forest_root = get_forest_root(ldap)?;
        Ok(format!("CN=MicrosoftDNS,DC=ForestDnsZones,{}", forest_root))
    } else {
        Ok(format!("CN=MicrosoftDNS,DC=DomainDnsZones,{}", search_base))
    }
}

fn get_forest_root(ldap: &mut LdapConn) -> Result<String, Box<dyn std::error::Error>> {
    debug_log(3, "Querying rootDomainNamingContext from RootDSE");

    let (results, _) = ldap
        .search(
            "",
            Scope::Base,
            "(objectClass=*)",
            vec!["rootDomainNamingContext"],
        )?
        .success()?;

    if let Some(entry) = results.first() {
        let search_entry = SearchEntry::construct(entry.clone());
        if let Some(forest_root) = search_entry
            .attrs
            .get("rootDomainNamingContext")
            .and_then(|v| v.first())
        {
            debug_log(3, format!("Forest root: {}", forest_root));
            return Ok(forest_root.clone());
        }
    }

    Err("Failed to retrieve rootDomainNamingContext from LDAP server".into())
}

/// Pull every dnsNode under a zone, with the owner portion of each
/// security descriptor. Pages manually so the SD-flags control rides
/// along on every request.
pub fn fetch_zone_nodes(
    ldap: &mut LdapConn,
    zone_dn: &str,
) -> Result<Vec<DnsNode>, Box<dyn std::error::Error>> {
    debug_log(2, format!("Enumerating dnsNode objects under {}", zone_dn));

    let sd_control = sd_flags_control(
        OWNER_SECURITY_INFORMATION | GROUP_SECURITY_INFORMATION | DACL_SECURITY_INFORMATION,
    );

    let mut nodes = Vec::new();
    let mut cookie: Vec<u8> = vec![];

    loop {
        let paging_control = paged_results_control(PAGE_SIZE, &cookie);
        ldap.with_controls(vec![sd_control.clone(), paging_control]);

        let (results, res) = ldap
            .search(
                zone_dn,
                Scope::OneLevel,
                "(objectClass=dnsNode)",
                vec!["dc", "dnsRecord", "dNSTombstoned", "nTSecurityDescriptor"],
            )?
            .success()?;

        for entry in results {
            let entry = SearchEntry::construct(entry);

            let name = match entry.attrs.get("dc").and_then(|v| v.first()) {
                Some(name) => name.clone(),
                None => continue,
            };

            let mut records = Vec::new();
            if let Some(blobs) = entry.bin_attrs.get("dnsRecord") {
                for blob in blobs {
                    match DnsRecord::from_bytes(blob) {
                        Ok(record) => {
                            debug_log(
                                3,
                                format!(
                                    "{}: {} record, serial {}, ttl {}s",
                                    name,
                                    get_record_type_name(record.record_type),
                                    record.serial,
                                    record.ttl_seconds
                                ),
                            );
                            records.push(record);
                        }
                        Err(e) => debug_log(
                            2,
                            format!(
                                "Skipping unparsable dnsRecord on {}: {} (raw: {})",
                                name,
                                e,
                                hex::encode(blob)
                            ),
                        ),
                    }
                }
            }

            // A tombstoned node sets dNSTombstoned and collapses its
            // record set to a single ZERO entry; either signal counts.
            let tombstoned = entry
                .attrs
                .get("dNSTombstoned")
                .map(|v| v.iter().any(|s| s.eq_ignore_ascii_case("true")))
                .unwrap_or(false)
                || records.iter().any(|r| r.is_tombstone());

            let owner = entry
                .bin_attrs
                .get("nTSecurityDescriptor")
                .and_then(|v| v.first())
                .and_then(|sd| SecurityDescriptor::from_bytes(sd).ok())
                .and_then(|sd| sd.owner_sid);

            nodes.push(DnsNode {
                name,
                dn: entry.dn,
                records,
                tombstoned,
                owner,
            });
        }

        cookie.clear();
        for ctrl in res.ctrls {
            let ldap3::controls::Control(_, raw) = ctrl;
            if raw.ctype == PAGED_RESULTS_OID {
                if let Some(val) = raw.val {
                    if val.len() > 4 {
                        let cookie_start = val.len().saturating_sub(val[val.len() - 2] as usize);
                        if cookie_start < val.len() {
                            cookie = val[cookie_start..].to_vec();
                        }
                    }
                }
                break;
            }
        }

        if cookie.is_empty() {
            break;
        }
    }

    debug_log(2, format!("Retrieved {} dnsNode objects", nodes.len()));
    Ok(nodes)
}

fn paged_results_control(page_size: i32, cookie: &[u8]) -> ldap3::controls::RawControl {
    let size_bytes = page_size.to_be_bytes();
    let mut size_encoded = vec![0x02]; // INTEGER tag
    if page_size <= 127 {
        size_encoded.push(0x01);
        size_encoded.push(size_bytes[3]);
    } else {
        size_encoded.push(0x02);
        size_encoded.push(size_bytes[2]);
        size_encoded.push(size_bytes[3]);
    }

    let mut cookie_encoded = vec![0x04]; // OCTET STRING tag
    cookie_encoded.push(cookie.len() as u8);
    cookie_encoded.extend_from_slice(cookie);

    let mut val = vec![0x30]; // SEQUENCE
    val.push((size_encoded.len() + cookie_encoded.len()) as u8);
    val.extend(size_encoded);
    val.extend(cookie_encoded);

    ldap3::controls::RawControl {
        ctype: PAGED_RESULTS_OID.to_string(),
        crit: false,
        val: Some(val),
    }
}

pub fn is_reverse_zone(zone: &str) -> bool {
    zone.to_ascii_lowercase().ends_with(".in-addr.arpa")
}

/// The address a reverse-zone node stands for: node labels prepended to
/// the zone prefix, all read back-to-front. Covers /8 through /24 zones.
pub fn implied_ipv4(zone: &str, record_name: &str) -> Option<Ipv4Addr> {
    let lower = zone.to_ascii_lowercase();
    let prefix = lower.strip_suffix(".in-addr.arpa")?;

    if record_name.is_empty() || record_name == "@" {
        return None;
    }

    let mut octets: Vec<u8> = Vec::new();
    for part in record_name.split('.').chain(prefix.split('.')) {
        octets.push(part.parse().ok()?);
    }
    if octets.len() != 4 {
        return None;
    }
    octets.reverse();

    Some(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_zone_name_detection() {
        assert!(is_reverse_zone("100.168.192.in-addr.arpa"));
        assert!(is_reverse_zone("10.IN-ADDR.ARPA"));
        assert!(!is_reverse_zone("corp.example.com"));
        assert!(!is_reverse_zone("in-addr.arpa.corp.example.com"));
    }

    #[test]
    fn implied_address_from_slash24_zone() {
        let ip = implied_ipv4("100.168.192.in-addr.arpa", "25").unwrap();
        assert_eq!(ip.to_string(), "192.168.100.25");
    }

    #[test]
    fn implied_address_from_slash16_zone() {
        let ip = implied_ipv4("168.192.in-addr.arpa", "25.100").unwrap();
        assert_eq!(ip.to_string(), "192.168.100.25");
    }

    #[test]
    fn apex_and_junk_nodes_have_no_address() {
        assert!(implied_ipv4("100.168.192.in-addr.arpa", "@").is_none());
        assert!(implied_ipv4("100.168.192.in-addr.arpa", "_ldap").is_none());
        assert!(implied_ipv4("corp.example.com", "web01").is_none());
        assert!(implied_ipv4("168.192.in-addr.arpa", "25").is_none());
    }

    #[test]
    fn paging_control_encodes_size_and_cookie() {
        let ctrl = paged_results_control(500, &[0xAB, 0xCD]);
        assert_eq!(ctrl.ctype, PAGED_RESULTS_OID);
        // SEQUENCE { INTEGER 500, OCTET STRING ABCD }
        assert_eq!(
            ctrl.val.unwrap(),
            vec![0x30, 0x08, 0x02, 0x02, 0x01, 0xF4, 0x04, 0x02, 0xAB, 0xCD]
        );
    }
}
