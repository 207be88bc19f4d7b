// Reverse-zone audit: one report row per dynamic PTR record, with the
// forward mapping and record ownership cross-checked.

use crate::acl::RecordOwner;
use crate::debug::debug_log;
use crate::directory::{find_computer_account, ComputerAccount, OwnerResolver};
use crate::dns::record::{record_types, DnsRecord};
use crate::dns::resolve;
use crate::dns::zones::{self, DnsNode, ZoneRef};
use crate::ldap::LdapConfig;
use crate::report::{self, Check, ReportRow};
use dialoguer::{theme::ColorfulTheme, MultiSelect};
use ldap3::LdapConn;
use std::net::Ipv4Addr;

pub fn run(
    ldap: &mut LdapConn,
    search_base: &str,
    config: &LdapConfig,
    zone_names: &[String],
    output: &str,
    no_grid: bool,
    assume_yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let targets = select_zones(ldap, search_base, zone_names, assume_yes)?;
    if targets.is_empty() {
        println!("[!] No reverse zones selected");
        return Ok(());
    }

    let mut resolver = OwnerResolver::new(&config.netbios);
    let mut rows: Vec<ReportRow> = Vec::new();

    for zone in &targets {
        println!("[*] Scanning reverse zone {} for dynamic PTR records", zone.name);
        let nodes = zones::fetch_zone_nodes(ldap, &zone.dn)?;

        for node in &nodes {
            if node.name == "@" {
                continue;
            }
            if !node.records.iter().any(scannable_ptr_record) {
                continue;
            }

            let owner = match &node.owner {
                Some(sid) => resolver.resolve(ldap, search_base, sid),
                None => RecordOwner::unreadable(),
            };
            let implied = zones::implied_ipv4(&zone.name, &node.name);

            for record in &node.records {
                if !scannable_ptr_record(record) {
                    continue;
                }

                let target = record.ptr_target();
                let account = match &target {
                    Some(target) => match find_computer_account(ldap, search_base, target) {
                        Ok(account) => account,
                        Err(e) => {
                            debug_log(
                                1,
                                format!("Account lookup failed for {}: {}", target, e),
                            );
                            None
                        }
                    },
                    None => None,
                };

                let checks = live_checks(&config.dns_server, target.as_deref(), implied);
                rows.push(build_row(
                    &zone.name,
                    node,
                    record,
                    target.as_deref(),
                    implied,
                    checks,
                    account.as_ref(),
                    &owner,
                ));
            }
        }
    }

    println!("[+] {} dynamic PTR record(s) reported", rows.len());
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

/// Zones given on the command line are looked up as-is; with none given,
/// every in-addr.arpa zone is offered for selection (or scanned outright
/// under --yes).
fn select_zones(
    ldap: &mut LdapConn,
    search_base: &str,
    zone_names: &[String],
    assume_yes: bool,
) -> Result<Vec<ZoneRef>, Box<dyn std::error::Error>> {
    if !zone_names.is_empty() {
        let mut targets = Vec::new();
        for name in zone_names {
            if !zones::is_reverse_zone(name) {
                println!("[!] {} is not a reverse lookup zone, skipping", name);
                continue;
            }
            targets.push(zones::find_zone(ldap, search_base, name)?);
        }
        return Ok(targets);
    }

    let mut found = zones::query_dns_zones(ldap, search_base, false)?;
    found.extend(zones::query_dns_zones(ldap, search_base, true)?);

    let mut reverse: Vec<ZoneRef> = Vec::new();
    for zone in found {
        if zones::is_reverse_zone(&zone.name)
            && !reverse.iter().any(|z: &ZoneRef| z.name == zone.name)
        {
            reverse.push(zone);
        }
    }

    if reverse.is_empty() {
        return Err("No reverse lookup zones found in the directory".into());
    }

    if assume_yes {
        return Ok(reverse);
    }

    let names: Vec<&str> = reverse.iter().map(|z| z.name.as_str()).collect();
    let picks = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select reverse zones to scan (space to toggle, enter to confirm)")
        .items(&names)
        .interact()?;

    Ok(picks.into_iter().map(|i| reverse[i].clone()).collect())
}

struct LiveChecks {
    resolves_to_a_record: Check,
    reverse_record_matches: Check,
}

/// One forward lookup answers both columns: does the PTR target resolve
/// at all, and does any answer point back at this node's address.
fn live_checks(server: &str, target: Option<&str>, implied: Option<Ipv4Addr>) -> LiveChecks {
    let target = match target {
        Some(target) => target,
        None => {
            return LiveChecks {
                resolves_to_a_record: Check::NotApplicable,
                reverse_record_matches: Check::NotApplicable,
            }
        }
    };

    match resolve::lookup_a(server, target) {
        Err(e) => {
            debug_log(1, format!("A lookup failed for {}: {}", target, e));
            LiveChecks {
                resolves_to_a_record: Check::NotFound,
                reverse_record_matches: Check::NotFound,
            }
        }
        Ok(answers) if answers.is_empty() => LiveChecks {
            resolves_to_a_record: Check::No,
            reverse_record_matches: Check::NotFound,
        },
        Ok(answers) => {
            let reverse_record_matches = match implied {
                Some(ip) => Check::from(answers.iter().any(|a| a == &ip.to_string())),
                None => Check::NotApplicable,
            };
            LiveChecks {
                resolves_to_a_record: Check::Yes,
                reverse_record_matches,
            }
        }
    }
}

fn scannable_ptr_record(record: &DnsRecord) -> bool {
    record.record_type == record_types::PTR && record.is_dynamic()
}

/// Containment test: an owner whose display name carries the machine
/// account's `NAME$` anywhere counts as that machine.
fn owner_matches_account(owner_name: &str, sam_account_name: &str) -> bool {
    owner_name
        .to_ascii_uppercase()
        .contains(&sam_account_name.to_ascii_uppercase())
}

/// Eligible when a computer account exists for the PTR target and the
/// owner is orphaned or names someone else. An unreadable owner is left
/// alone rather than overwritten blind.
fn remediation_eligible(account: Option<&ComputerAccount>, owner: &RecordOwner) -> bool {
    let Some(account) = account else {
        return false;
    };

    match owner {
        RecordOwner::Orphaned { .. } => true,
        RecordOwner::Resolved {
            account: owner_name,
            ..
        } => !owner_matches_account(owner_name, &account.sam_account_name),
        RecordOwner::Unresolvable { .. } => false,
    }
}

fn build_row(
    zone: &str,
    node: &DnsNode,
    record: &DnsRecord,
    target: Option<&str>,
    implied: Option<Ipv4Addr>,
    checks: LiveChecks,
    account: Option<&ComputerAccount>,
    owner: &RecordOwner,
) -> ReportRow {
    let ad_account_exists = match target {
        Some(_) => Check::from(account.is_some()),
        None => Check::NotApplicable,
    };

    ReportRow {
        dns_zone: zone.to_string(),
        record_name: node.name.clone(),
        hostname: target.map(str::to_string).unwrap_or_else(|| "Not Found".to_string()),
        ip_address: implied
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "Not Applicable".to_string()),
        distinguished_name: node.dn.clone(),
        record_timestamp: report::timestamp_cell(record.timestamp_utc()),
        tombstoned: node.tombstoned,
        resolves_to_a_record: checks.resolves_to_a_record,
        reverse_record_matches: checks.reverse_record_matches,
        ad_account_exists,
        record_owner: owner.display_name(),
        owner_kind: owner.kind(),
        remediate_owner: target.is_some() && remediation_eligible(account, owner),
    }
}
