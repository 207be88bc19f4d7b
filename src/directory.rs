// Computer-account and SID lookups against the domain partition.

use crate::acl::owner::well_known_name;
use crate::acl::{LdapSid, RecordOwner};
use crate::debug::debug_log;
use crate::ldap::escape_filter;
use ldap3::{LdapConn, Scope, SearchEntry};
use std::collections::HashMap;

/// A computer object matched to a DNS record's hostname.
#[derive(Debug, Clone)]
pub struct ComputerAccount {
    pub sam_account_name: String,
    pub dn: String,
    pub sid: Option<String>,
}

/// First label of a hostname, so `web01.corp.example.com` and `web01`
/// both map to the same account.
pub fn short_hostname(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

fn computer_filter(hostname: &str) -> String {
    format!(
        "(&(objectClass=computer)(sAMAccountName={}$))",
        escape_filter(short_hostname(hostname))
    )
}

/// Look up the computer account a hostname implies. `Ok(None)` means the
/// directory has no such account.
pub fn find_computer_account(
    ldap: &mut LdapConn,
    search_base: &str,
    hostname: &str,
) -> Result<Option<ComputerAccount>, Box<dyn std::error::Error>> {
    let filter = computer_filter(hostname);
    debug_log(3, format!("Computer account search: {}", filter));

    let (results, _) = ldap
        .search(
            search_base,
            Scope::Subtree,
            &filter,
            vec!["sAMAccountName", "objectSid"],
        )?
        .success()?;

    let entry = match results.first() {
        Some(entry) => SearchEntry::construct(entry.clone()),
        None => return Ok(None),
    };

    let sam_account_name = entry
        .attrs
        .get("sAMAccountName")
        .and_then(|v| v.first())
        .cloned()
        .unwrap_or_else(|| format!("{}$", short_hostname(hostname)));

    let sid = entry
        .bin_attrs
        .get("objectSid")
        .and_then(|v| v.first())
        .and_then(|raw| LdapSid::from_bytes(raw).ok())
        .map(|sid| sid.to_string());

    Ok(Some(ComputerAccount {
        sam_account_name,
        dn: entry.dn,
        sid,
    }))
}

fn lookup_account_by_sid(
    ldap: &mut LdapConn,
    search_base: &str,
    sid: &LdapSid,
    netbios: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let filter = format!("(objectSid={})", sid.to_ldap_filter());

    let (results, _) = ldap
        .search(search_base, Scope::Subtree, &filter, vec!["sAMAccountName"])?
        .success()?;

    if let Some(entry) = results.first() {
        let entry = SearchEntry::construct(entry.clone());
        if let Some(sam) = entry.attrs.get("sAMAccountName").and_then(|v| v.first()) {
            return Ok(Some(format!("{}\\{}", netbios, sam)));
        }
    }

    Ok(None)
}

/// SID-to-owner resolution with a per-run cache. Zones tend to repeat a
/// handful of owners across hundreds of nodes, so each SID hits LDAP at
/// most once.
pub struct OwnerResolver {
    cache: HashMap<String, RecordOwner>,
    netbios: String,
}

impl OwnerResolver {
    pub fn new(netbios: &str) -> Self {
        OwnerResolver {
            cache: HashMap::new(),
            netbios: netbios.to_string(),
        }
    }

    pub fn resolve(
        &mut self,
        ldap: &mut LdapConn,
        search_base: &str,
        sid: &LdapSid,
    ) -> RecordOwner {
        let key = sid.to_string();
        if let Some(owner) = self.cache.get(&key) {
            return owner.clone();
        }

        let owner = if well_known_name(&key).is_some() {
            RecordOwner::classify(sid, None)
        } else {
            match lookup_account_by_sid(ldap, search_base, sid, &self.netbios) {
                Ok(account) => RecordOwner::classify(sid, account.as_deref()),
                Err(e) => {
                    debug_log(2, format!("SID translation failed for {}: {}", key, e));
                    RecordOwner::translation_failed(sid)
                }
            }
        };

        self.cache.insert(key, owner.clone());
        owner
    }
}
