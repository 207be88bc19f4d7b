// Forward-zone ownership audit: one report row per dynamic A record,
// cross-checked against live DNS and the directory.

use crate::acl::RecordOwner;
use crate::commands::{is_infrastructure_name, names_equal};
use crate::debug::debug_log;
use crate::directory::{find_computer_account, ComputerAccount, OwnerResolver};
use crate::dns::record::{record_types, DnsRecord};
use crate::dns::resolve;
use crate::dns::zones::{self, DnsNode};
use crate::ldap::LdapConfig;
use crate::report::{self, Check, ReportRow};
use ldap3::LdapConn;
use std::net::Ipv4Addr;

pub fn run(
    ldap: &mut LdapConn,
    search_base: &str,
    config: &LdapConfig,
    zone: Option<&str>,
    output: &str,
    no_grid: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let zone = zone.unwrap_or(&config.domain).to_string();

    println!("[*] Scanning forward zone {} for dynamic A records", zone);
    let zone_ref = zones::find_zone(ldap, search_base, &zone)?;
    let nodes = zones::fetch_zone_nodes(ldap, &zone_ref.dn)?;

    let mut resolver = OwnerResolver::new(&config.netbios);
    let mut rows: Vec<ReportRow> = Vec::new();

    for node in &nodes {
        if is_infrastructure_name(&node.name, &zone) {
            debug_log(3, format!("Skipping infrastructure node {}", node.name));
            continue;
        }
        if !node.records.iter().any(scannable_a_record) {
            continue;
        }

        let owner = match &node.owner {
            Some(sid) => resolver.resolve(ldap, search_base, sid),
            None => RecordOwner::unreadable(),
        };

        // Lookup failure reads as "no account", never a dead scan.
        let account = match find_computer_account(ldap, search_base, &node.name) {
            Ok(account) => account,
            Err(e) => {
                debug_log(1, format!("Account lookup failed for {}: {}", node.name, e));
                None
            }
        };

        for record in &node.records {
            if !scannable_a_record(record) {
                continue;
            }
            let ip = match record.ipv4() {
                Some(ip) => ip,
                None => {
                    debug_log(2, format!("Malformed A record data on {}", node.name));
                    continue;
                }
            };

            let fqdn = format!("{}.{}", node.name, zone);
            let checks = live_checks(&config.dns_server, &fqdn, ip);
            rows.push(build_row(
                &zone,
                node,
                record,
                ip,
                checks,
                account.as_ref(),
                &owner,
            ));
        }
    }

    println!("[+] {} dynamic A record(s) reported", rows.len());
    let flagged = rows.iter().filter(|r| r.remediate_owner).count();
    if flagged > 0 {
        println!(
            "[!] {} record(s) pre-flagged for ownership remediation",
            flagged
        );
    }

    if !no_grid {
        report::print_table(&rows);
    }
    report::write_csv(output, &rows)?;
    println!("[+] Report written to {}", output);

    Ok(())
}

struct LiveChecks {
    resolves_to_a_record: Check,
    reverse_record_matches: Check,
}

fn live_checks(server: &str, fqdn: &str, ip: Ipv4Addr) -> LiveChecks {
    let resolves_to_a_record = match resolve::lookup_a(server, fqdn) {
        Ok(answers) => Check::from(!answers.is_empty()),
        Err(e) => {
            debug_log(1, format!("A lookup failed for {}: {}", fqdn, e));
            Check::NotFound
        }
    };

    let reverse_record_matches = match resolve::lookup_ptr(server, ip) {
        Ok(answers) if answers.is_empty() => Check::NotFound,
        Ok(answers) => Check::from(answers.iter().any(|target| names_equal(target, fqdn))),
        Err(e) => {
            debug_log(1, format!("PTR lookup failed for {}: {}", ip, e));
            Check::NotFound
        }
    };

    LiveChecks {
        resolves_to_a_record,
        reverse_record_matches,
    }
}

fn scannable_a_record(record: &DnsRecord) -> bool {
    record.record_type == record_types::A && record.is_dynamic()
}

/// Exact-SID test: eligible when an account exists for the name and the
/// owner is not provably that account already.
fn remediation_eligible(account: Option<&ComputerAccount>, owner: &RecordOwner) -> bool {
    match account {
        Some(account) => match (account.sid.as_deref(), owner.sid_str()) {
            (Some(account_sid), Some(owner_sid)) => account_sid != owner_sid,
            _ => true,
        },
        None => false,
    }
}

fn build_row(
    zone: &str,
    node: &DnsNode,
    record: &DnsRecord,
    ip: Ipv4Addr,
    checks: LiveChecks,
    account: Option<&ComputerAccount>,
    owner: &RecordOwner,
) -> ReportRow {
    ReportRow {
        dns_zone: zone.to_string(),
        record_name: node.name.clone(),
        hostname: format!("{}.{}", node.name, zone),
        ip_address: ip.to_string(),
        distinguished_name: node.dn.clone(),
        record_timestamp: report::timestamp_cell(record.timestamp_utc()),
        tombstoned: node.tombstoned,
        resolves_to_a_record: checks.resolves_to_a_record,
        reverse_record_matches: checks.reverse_record_matches,
        ad_account_exists: Check::from(account.is_some()),
        record_owner: owner.display_name(),
        owner_kind: owner.kind(),
        remediate_owner: remediation_eligible(account, owner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{LdapSid, OwnerKind};

    fn node(name: &str) -> DnsNode {
        DnsNode {
            name: name.to_string(),
            dn: format!(
                "DC={},DC=contoso.com,CN=MicrosoftDNS,DC=DomainDnsZones,DC=contoso,DC=com",
                name
            ),
            records: Vec::new(),
            tombstoned: false,
            owner: None,
        }
    }

    fn dynamic_a(ip: [u8; 4]) -> DnsRecord {
        DnsRecord {
            data_length: 4,
            record_type: record_types::A,
            version: 5,
            rank: 240,
            flags: 0,
            serial: 7,
            ttl_seconds: 1200,
            reserved: 0,
            timestamp: 3702048,
            data: ip.to_vec(),
        }
    }

    fn account(sam: &str, sid: &str) -> ComputerAccount {
        ComputerAccount {
            sam_account_name: sam.to_string(),
            dn: format!(
                "CN={},CN=Computers,DC=contoso,DC=com",
                sam.trim_end_matches('$')
            ),
            sid: Some(sid.to_string()),
        }
    }

    fn all_good() -> LiveChecks {
        LiveChecks {
            resolves_to_a_record: Check::Yes,
            reverse_record_matches: Check::Yes,
        }
    }

    #[test]
    fn owner_already_matching_account_is_not_flagged() {
        let sid = "S-1-5-21-3623811015-3361044348-30300820-1104";
        let owner =
            RecordOwner::classify(&LdapSid::parse(sid).unwrap(), Some("CONTOSO\\HOST1$"));
        let acct = account("HOST1$", sid);

        let row = build_row(
            "contoso.com",
            &node("HOST1"),
            &dynamic_a([10, 1, 0, 11]),
            Ipv4Addr::new(10, 1, 0, 11),
            all_good(),
            Some(&acct),
            &owner,
        );

        assert_eq!(row.ad_account_exists, Check::Yes);
        assert_eq!(row.owner_kind, OwnerKind::ComputerAccount);
        assert!(!row.remediate_owner);
        assert_eq!(row.hostname, "HOST1.contoso.com");
        assert_eq!(row.record_timestamp, "2023-05-01 00:00:00 UTC");
    }

    #[test]
    fn orphaned_owner_without_account_cannot_be_remediated() {
        let sid = "S-1-5-21-3623811015-3361044348-30300820-9999";
        let owner = RecordOwner::classify(&LdapSid::parse(sid).unwrap(), None);

        let row = build_row(
            "contoso.com",
            &node("HOST2"),
            &dynamic_a([10, 1, 0, 12]),
            Ipv4Addr::new(10, 1, 0, 12),
            all_good(),
            None,
            &owner,
        );

        assert_eq!(row.ad_account_exists, Check::No);
        assert_eq!(row.owner_kind, OwnerKind::OrphanedSid);
        assert_eq!(row.record_owner, sid);
        assert!(!row.remediate_owner);
    }

    #[test]
    fn mismatched_owner_with_account_is_flagged() {
        let owner = RecordOwner::classify(
            &LdapSid::parse("S-1-5-21-3623811015-3361044348-30300820-1105").unwrap(),
            Some("CONTOSO\\jdoe"),
        );
        let acct = account("HOST3$", "S-1-5-21-3623811015-3361044348-30300820-1301");

        let row = build_row(
            "contoso.com",
            &node("HOST3"),
            &dynamic_a([10, 1, 0, 13]),
            Ipv4Addr::new(10, 1, 0, 13),
            all_good(),
            Some(&acct),
            &owner,
        );

        assert_eq!(row.owner_kind, OwnerKind::UserAccount);
        assert!(row.remediate_owner);
    }

    #[test]
    fn unreadable_owner_with_account_is_flagged() {
        let owner = RecordOwner::unreadable();
        let acct = account("HOST4$", "S-1-5-21-3623811015-3361044348-30300820-1401");

        let row = build_row(
            "contoso.com",
            &node("HOST4"),
            &dynamic_a([10, 1, 0, 14]),
            Ipv4Addr::new(10, 1, 0, 14),
            all_good(),
            Some(&acct),
            &owner,
        );

        assert_eq!(row.record_owner, "Owner Not Resolvable");
        assert!(row.remediate_owner);
    }

    #[test]
    fn static_and_non_a_records_are_not_scannable() {
        let mut static_a = dynamic_a([10, 1, 0, 15]);
        static_a.timestamp = 0;
        assert!(!scannable_a_record(&static_a));

        let mut ptr = dynamic_a([10, 1, 0, 15]);
        ptr.record_type = record_types::PTR;
        assert!(!scannable_a_record(&ptr));

        assert!(scannable_a_record(&dynamic_a([10, 1, 0, 15])));
    }
}
