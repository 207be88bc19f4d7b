// Ownership remediation: re-own records an operator flagged in a scan
// CSV. Each row stands alone; one failure never stops the batch.

use crate::acl::structures::{sd_flags_control, OWNER_SECURITY_INFORMATION};
use crate::acl::{LdapSid, SecurityDescriptor};
use crate::debug::debug_log;
use crate::directory::{find_computer_account, short_hostname, OwnerResolver};
use crate::ldap::LdapConfig;
use crate::report::CsvTable;
use dialoguer::{theme::ColorfulTheme, Confirm};
use ldap3::{LdapConn, Mod, Scope, SearchEntry};
use std::collections::HashSet;

#[derive(Debug)]
struct ReportColumns {
    dn: usize,
    hostname: usize,
    flag: usize,
    owner: Option<usize>,
}

fn locate_columns(table: &CsvTable) -> Result<ReportColumns, Box<dyn std::error::Error>> {
    // Older reports used different spellings for these columns.
    let dn = table
        .column("DistinguishedName")
        .or_else(|| table.column("DistinguishedNames"));
    let hostname = table
        .column("Hostname")
        .or_else(|| table.column("PtrHostName"));
    let flag = table
        .column("RemediateOwner")
        .or_else(|| table.column("RemediateAccountMatch"));

    let (Some(dn), Some(hostname), Some(flag)) = (dn, hostname, flag) else {
        let mut missing = Vec::new();
        if dn.is_none() {
            missing.push("DistinguishedName");
        }
        if hostname.is_none() {
            missing.push("Hostname");
        }
        if flag.is_none() {
            missing.push("RemediateOwner");
        }
        return Err(format!(
            "Input CSV is missing required column(s): {}",
            missing.join(", ")
        )
        .into());
    };

    Ok(ReportColumns {
        dn,
        hostname,
        flag,
        owner: table.column("RecordOwner"),
    })
}

/// Only the literal lowercase string arms a row; hand-edits like "True"
/// or "yes" deliberately do not.
fn flag_is_set(cell: &str) -> bool {
    cell == "true"
}

struct FlaggedRow {
    line: usize,
    dn: String,
    hostname: String,
    owner_cell: String,
}

fn collect_flagged(table: &CsvTable, columns: &ReportColumns) -> (Vec<FlaggedRow>, Vec<String>) {
    let mut flagged = Vec::new();
    let mut errors = Vec::new();

    for (index, row) in table.rows.iter().enumerate() {
        let line = index + 2; // header occupies line 1
        if !flag_is_set(row.get(columns.flag).unwrap_or("")) {
            continue;
        }

        let dn = row.get(columns.dn).unwrap_or("").trim();
        let hostname = row.get(columns.hostname).unwrap_or("").trim();
        if dn.is_empty() || hostname.is_empty() {
            errors.push(format!(
                "Row {}: flagged but DistinguishedName or Hostname is empty",
                line
            ));
            continue;
        }

        flagged.push(FlaggedRow {
            line,
            dn: dn.to_string(),
            hostname: hostname.to_string(),
            owner_cell: columns
                .owner
                .and_then(|i| row.get(i))
                .unwrap_or("")
                .trim()
                .to_string(),
        });
    }

    (flagged, errors)
}

pub fn run(
    ldap: &mut LdapConn,
    search_base: &str,
    config: &LdapConfig,
    input: &str,
    verify_owner: bool,
    dry_run: bool,
    assume_yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("[*] Loading report {}", input);
    let table = CsvTable::from_path(input)?;
    if table.is_empty() {
        return Err("Input CSV contains no data rows".into());
    }
    let columns = locate_columns(&table)?;
    if verify_owner && columns.owner.is_none() {
        return Err("--verify-owner needs a RecordOwner column in the input CSV".into());
    }

    let (flagged, row_errors) = collect_flagged(&table, &columns);
    let mut failures = row_errors.len();
    for error in &row_errors {
        eprintln!("[!] {}", error);
    }

    if flagged.is_empty() {
        println!(
            "[*] No rows flagged for remediation ({} row(s) scanned)",
            table.rows.len()
        );
        return Ok(());
    }

    println!(
        "[*] {} of {} row(s) flagged for ownership remediation",
        flagged.len(),
        table.rows.len()
    );

    if !dry_run && !assume_yes {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Re-own {} DNS record(s)?", flagged.len()))
            .default(false)
            .interact()?;
        if !proceed {
            println!("[!] Aborted, nothing written");
            return Ok(());
        }
    }

    let mut resolver = OwnerResolver::new(&config.netbios);
    let mut applied = 0usize;

    for row in &flagged {
        match remediate_row(ldap, search_base, &mut resolver, row, verify_owner, dry_run) {
            Ok(()) => applied += 1,
            Err(e) => {
                eprintln!("[!] Row {} ({}): {}", row.line, row.hostname, e);
                failures += 1;
            }
        }
    }

    if dry_run {
        println!(
            "[+] Dry run: {} change(s) would be applied, {} failure(s)",
            applied, failures
        );
    } else {
        println!("[+] {} owner(s) applied, {} failure(s)", applied, failures);
    }

    Ok(())
}

fn remediate_row(
    ldap: &mut LdapConn,
    search_base: &str,
    resolver: &mut OwnerResolver,
    row: &FlaggedRow,
    verify_owner: bool,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let account = find_computer_account(ldap, search_base, &row.hostname)?
        .ok_or_else(|| format!("no computer account for {}", short_hostname(&row.hostname)))?;
    debug_log(
        3,
        format!(
            "Computer account {} at {}",
            account.sam_account_name, account.dn
        ),
    );
    let sid_string = account
        .sid
        .clone()
        .ok_or("computer account carries no objectSid")?;
    let owner_sid = LdapSid::parse(&sid_string)?;

    if verify_owner {
        verify_current_owner(ldap, search_base, resolver, &row.dn, &row.owner_cell)?;
    }

    if dry_run {
        println!(
            "[*] Would set owner of {} to {}",
            row.dn, account.sam_account_name
        );
        return Ok(());
    }

    // Owner-scoped write: the control keeps the server from touching the
    // DACL/SACL parts this descriptor does not carry.
    let descriptor = SecurityDescriptor::owner_only(owner_sid);
    let mut value_set = HashSet::new();
    value_set.insert(descriptor.to_bytes());

    debug_log(
        2,
        format!("Writing owner {} to {}", account.sam_account_name, row.dn),
    );
    ldap.with_controls(vec![sd_flags_control(OWNER_SECURITY_INFORMATION)]);
    ldap.modify(
        &row.dn,
        vec![Mod::Replace(b"nTSecurityDescriptor".to_vec(), value_set)],
    )?
    .success()?;

    println!(
        "[+] {} now owned by {}",
        row.hostname, account.sam_account_name
    );
    Ok(())
}

fn read_current_owner_sid(
    ldap: &mut LdapConn,
    dn: &str,
) -> Result<Option<LdapSid>, Box<dyn std::error::Error>> {
    ldap.with_controls(vec![sd_flags_control(OWNER_SECURITY_INFORMATION)]);
    let (results, _) = ldap
        .search(dn, Scope::Base, "(objectClass=*)", vec!["nTSecurityDescriptor"])?
        .success()?;

    let entry = results.first().ok_or("record object not found")?;
    let entry = SearchEntry::construct(entry.clone());

    Ok(entry
        .bin_attrs
        .get("nTSecurityDescriptor")
        .and_then(|v| v.first())
        .and_then(|sd| SecurityDescriptor::from_bytes(sd).ok())
        .and_then(|sd| sd.owner_sid))
}

/// The stale-data seam: refuse to overwrite an owner that changed between
/// scan and remediation.
fn verify_current_owner(
    ldap: &mut LdapConn,
    search_base: &str,
    resolver: &mut OwnerResolver,
    dn: &str,
    owner_cell: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let current = read_current_owner_sid(ldap, dn)?
        .ok_or("current owner is not readable, cannot verify")?;

    if current.to_string() == owner_cell {
        return Ok(());
    }
    let display = resolver.resolve(ldap, search_base, &current).display_name();
    if display.eq_ignore_ascii_case(owner_cell) {
        return Ok(());
    }

    Err(format!(
        "live owner {} no longer matches scanned owner {}",
        display, owner_cell
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &str =
        "DnsZone,RecordName,Hostname,DistinguishedName,RecordOwner,RemediateOwner\n";

    fn table(body: &str) -> CsvTable {
        let csv = format!("{}{}", HEADERS, body);
        CsvTable::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn flag_requires_exact_lowercase_true() {
        assert!(flag_is_set("true"));
        assert!(!flag_is_set("True"));
        assert!(!flag_is_set("TRUE"));
        assert!(!flag_is_set(" true"));
        assert!(!flag_is_set("false"));
        assert!(!flag_is_set(""));
    }

    #[test]
    fn columns_resolve_by_name_with_legacy_aliases() {
        let modern = table("");
        assert!(locate_columns(&modern).is_ok());

        let legacy = CsvTable::from_reader(
            "PtrHostName,DistinguishedNames,RemediateAccountMatch\nh,d,true\n".as_bytes(),
        )
        .unwrap();
        let columns = locate_columns(&legacy).unwrap();
        assert_eq!(columns.hostname, 0);
        assert_eq!(columns.dn, 1);
        assert_eq!(columns.flag, 2);
        assert!(columns.owner.is_none());
    }

    #[test]
    fn missing_required_columns_are_fatal() {
        let broken = CsvTable::from_reader("DnsZone,Hostname\nz,h\n".as_bytes()).unwrap();
        let err = locate_columns(&broken).unwrap_err().to_string();
        assert!(err.contains("DistinguishedName"));
        assert!(err.contains("RemediateOwner"));
        assert!(!err.contains("Hostname"));
    }

    #[test]
    fn only_literally_flagged_rows_are_collected() {
        let t = table(concat!(
            "z,r1,host1.corp.example.com,DC=host1,CORP\\HOST1$,true\n",
            "z,r2,host2.corp.example.com,DC=host2,CORP\\HOST2$,True\n",
            "z,r3,host3.corp.example.com,DC=host3,CORP\\HOST3$,false\n",
        ));
        let columns = locate_columns(&t).unwrap();
        let (flagged, errors) = collect_flagged(&t, &columns);

        assert_eq!(flagged.len(), 1);
        assert!(errors.is_empty());
        assert_eq!(flagged[0].line, 2);
        assert_eq!(flagged[0].hostname, "host1.corp.example.com");
        assert_eq!(flagged[0].owner_cell, "CORP\\HOST1$");
    }

    #[test]
    fn flagged_row_without_identity_is_an_error_not_a_skip() {
        let t = table(concat!(
            "z,r1,host1.corp.example.com,,CORP\\HOST1$,true\n",
            "z,r2,,DC=host2,CORP\\HOST2$,true\n",
            "z,r3,host3.corp.example.com,DC=host3,CORP\\HOST3$,true\n",
        ));
        let columns = locate_columns(&t).unwrap();
        let (flagged, errors) = collect_flagged(&t, &columns);

        assert_eq!(flagged.len(), 1);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("Row 2"));
        assert!(errors[1].contains("Row 3"));
    }
}
