// Report rows: the CSV contract between the scanners and the remediator.

use crate::acl::OwnerKind;
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;

pub const CSV_HEADERS: [&str; 13] = [
    "DnsZone",
    "RecordName",
    "Hostname",
    "IpAddress",
    "DistinguishedName",
    "RecordTimestamp",
    "Tombstoned",
    "ResolvesToARecord",
    "ReverseRecordMatches",
    "AdAccountExists",
    "RecordOwner",
    "OwnerKind",
    "RemediateOwner",
];

/// A tri-state-plus answer for the cross-check columns. Placeholder text
/// keeps "could not check" distinguishable from a plain "no".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Yes,
    No,
    NotFound,
    NotApplicable,
}

impl Check {
    pub fn as_str(&self) -> &'static str {
        match self {
            Check::Yes => "true",
            Check::No => "false",
            Check::NotFound => "Not Found",
            Check::NotApplicable => "Not Applicable",
        }
    }
}

impl From<bool> for Check {
    fn from(b: bool) -> Self {
        if b {
            Check::Yes
        } else {
            Check::No
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub dns_zone: String,
    pub record_name: String,
    pub hostname: String,
    pub ip_address: String,
    pub distinguished_name: String,
    pub record_timestamp: String,
    pub tombstoned: bool,
    pub resolves_to_a_record: Check,
    pub reverse_record_matches: Check,
    pub ad_account_exists: Check,
    pub record_owner: String,
    pub owner_kind: OwnerKind,
    pub remediate_owner: bool,
}

impl ReportRow {
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.dns_zone.clone(),
            self.record_name.clone(),
            self.hostname.clone(),
            self.ip_address.clone(),
            self.distinguished_name.clone(),
            self.record_timestamp.clone(),
            bool_cell(self.tombstoned),
            self.resolves_to_a_record.as_str().to_string(),
            self.reverse_record_matches.as_str().to_string(),
            self.ad_account_exists.as_str().to_string(),
            self.record_owner.clone(),
            self.owner_kind.as_str().to_string(),
            bool_cell(self.remediate_owner),
        ]
    }
}

fn bool_cell(b: bool) -> String {
    if b { "true" } else { "false" }.to_string()
}

pub fn timestamp_cell(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "Static".to_string(),
    }
}

pub fn write_csv(path: &str, rows: &[ReportRow]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(Path::new(path))?;
    writer.write_record(CSV_HEADERS)?;
    for row in rows {
        writer.write_record(row.to_record())?;
    }
    writer.flush()?;
    Ok(())
}

/// Console review dump: the columns an operator looks at before deciding
/// which rows to flag.
pub fn print_table(rows: &[ReportRow]) {
    println!(
        "{:<24} {:<16} {:<30} {:<28} {:<16} {:<10}",
        "RecordName", "IpAddress", "Hostname", "RecordOwner", "OwnerKind", "Remediate"
    );
    println!("{}", "-".repeat(128));
    for row in rows {
        println!(
            "{:<24} {:<16} {:<30} {:<28} {:<16} {:<10}",
            row.record_name,
            row.ip_address,
            row.hostname,
            row.record_owner,
            row.owner_kind.as_str(),
            bool_cell(row.remediate_owner),
        );
    }
}

/// A loaded CSV with by-name column access. Header matching ignores case
/// so hand-edited files survive.
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<csv::StringRecord>,
}

impl CsvTable {
    pub fn from_path(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, Box<dyn std::error::Error>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?);
        }

        Ok(CsvTable { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
