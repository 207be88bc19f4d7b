// Record-owner classification: who owns a dnsNode object, and is that
// owner still a real principal.

use crate::acl::structures::LdapSid;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;

pub const OWNER_NOT_RESOLVABLE: &str = "Owner Not Resolvable";

/// Well-known SIDs that can plausibly turn up as object owners; resolved
/// locally, no directory round-trip.
const WELL_KNOWN_SIDS: &[(&str, &str)] = &[
    ("S-1-0-0", "Nobody"),
    ("S-1-1-0", "Everyone"),
    ("S-1-3-0", "Creator Owner"),
    ("S-1-3-1", "Creator Group"),
    ("S-1-3-4", "Owner Rights"),
    ("S-1-5-6", "Service"),
    ("S-1-5-7", "Anonymous"),
    ("S-1-5-9", "Enterprise Domain Controllers"),
    ("S-1-5-10", "Principal Self"),
    ("S-1-5-11", "Authenticated Users"),
    ("S-1-5-18", "Local System"),
    ("S-1-5-19", "NT Authority"),
    ("S-1-5-20", "NT Authority"),
    ("S-1-5-32-544", "BUILTIN\\Administrators"),
    ("S-1-5-32-545", "BUILTIN\\Users"),
    ("S-1-5-32-546", "BUILTIN\\Guests"),
    ("S-1-5-32-548", "BUILTIN\\Account Operators"),
    ("S-1-5-32-549", "BUILTIN\\Server Operators"),
    ("S-1-5-32-550", "BUILTIN\\Print Operators"),
    ("S-1-5-32-551", "BUILTIN\\Backup Operators"),
    ("S-1-5-32-554", "BUILTIN\\Pre-Windows 2000 Compatible Access"),
    ("S-1-5-32-561", "BUILTIN\\Terminal Server License Servers"),
    ("S-1-5-80", "NT Service"),
];

lazy_static! {
    static ref WELL_KNOWN: HashMap<&'static str, &'static str> =
        WELL_KNOWN_SIDS.iter().cloned().collect();
}

pub fn well_known_name(sid: &str) -> Option<&'static str> {
    WELL_KNOWN.get(sid).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    ComputerAccount,
    UserAccount,
    WellKnown,
    OrphanedSid,
    Unknown,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::ComputerAccount => "ComputerAccount",
            OwnerKind::UserAccount => "UserAccount",
            OwnerKind::WellKnown => "WellKnown",
            OwnerKind::OrphanedSid => "OrphanedSid",
            OwnerKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The owner of one record object, after resolution. A typed value, so
/// placeholder strings stay at the report boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOwner {
    /// SID translated to a live principal.
    Resolved {
        sid: String,
        account: String,
        kind: OwnerKind,
    },
    /// SID parsed fine but no principal carries it any more.
    Orphaned { sid: String },
    /// Descriptor missing/unparsable, or the translation itself errored.
    Unresolvable { sid: Option<String> },
}

impl RecordOwner {
    /// Classify a parsed owner SID. `directory_account` is the translated
    /// account name (already `DOMAIN\name`-prefixed) when the directory
    /// lookup found one, `None` when the lookup came back empty.
    pub fn classify(sid: &LdapSid, directory_account: Option<&str>) -> Self {
        let sid = sid.to_string();

        if let Some(name) = well_known_name(&sid) {
            return RecordOwner::Resolved {
                sid,
                account: name.to_string(),
                kind: OwnerKind::WellKnown,
            };
        }

        match directory_account {
            Some(account) => {
                let kind = if account.ends_with('$') {
                    OwnerKind::ComputerAccount
                } else {
                    OwnerKind::UserAccount
                };
                RecordOwner::Resolved {
                    sid,
                    account: account.to_string(),
                    kind,
                }
            }
            None => RecordOwner::Orphaned { sid },
        }
    }

    pub fn translation_failed(sid: &LdapSid) -> Self {
        RecordOwner::Unresolvable {
            sid: Some(sid.to_string()),
        }
    }

    pub fn unreadable() -> Self {
        RecordOwner::Unresolvable { sid: None }
    }

    pub fn kind(&self) -> OwnerKind {
        match self {
            RecordOwner::Resolved { kind, .. } => *kind,
            RecordOwner::Orphaned { .. } => OwnerKind::OrphanedSid,
            RecordOwner::Unresolvable { .. } => OwnerKind::Unknown,
        }
    }

    pub fn sid_str(&self) -> Option<&str> {
        match self {
            RecordOwner::Resolved { sid, .. } | RecordOwner::Orphaned { sid } => Some(sid),
            RecordOwner::Unresolvable { sid } => sid.as_deref(),
        }
    }

    /// The report-cell rendering: account name, bare SID for orphans, and
    /// the explanatory placeholder when nothing could be read.
    pub fn display_name(&self) -> String {
        match self {
            RecordOwner::Resolved { account, .. } => account.clone(),
            RecordOwner::Orphaned { sid } => sid.clone(),
            RecordOwner::Unresolvable { .. } => OWNER_NOT_RESOLVABLE.to_string(),
        }
    }

    #[allow(dead_code)]
    pub fn is_orphaned(&self) -> bool {
        matches!(self, RecordOwner::Orphaned { .. })
    }
}
