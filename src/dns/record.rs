// dnsRecord attribute parsing. Each value is one DNS_RPC_RECORD blob:
// a fixed 24-byte header followed by type-specific data.

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use std::io::Cursor;
use std::net::Ipv4Addr;

/// Seconds between 1601-01-01 and the Unix epoch.
const EPOCH_DELTA_SECS: i64 = 11_644_473_600;

pub mod record_types {
    pub const ZERO: u16 = 0; // Tombstone
    pub const A: u16 = 1;
    #[allow(dead_code)]
    pub const NS: u16 = 2;
    #[allow(dead_code)]
    pub const CNAME: u16 = 5;
    #[allow(dead_code)]
    pub const SOA: u16 = 6;
    pub const PTR: u16 = 12;
    #[allow(dead_code)]
    pub const AAAA: u16 = 28;
    #[allow(dead_code)]
    pub const SRV: u16 = 33;
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct DnsRecord {
    pub data_length: u16,
    pub record_type: u16,
    pub version: u8,
    pub rank: u8,
    pub flags: u16,
    pub serial: u32,
    pub ttl_seconds: u32,
    pub reserved: u32,
    pub timestamp: u32,
    pub data: Vec<u8>,
}

impl DnsRecord {
    pub fn from_bytes(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        let mut cursor = Cursor::new(data);

        let data_length = cursor.read_u16::<LittleEndian>()?;
        let record_type = cursor.read_u16::<LittleEndian>()?;
        let version = cursor.read_u8()?;
        let rank = cursor.read_u8()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let serial = cursor.read_u32::<LittleEndian>()?;
        let ttl_seconds = cursor.read_u32::<LittleEndian>()?;
        let reserved = cursor.read_u32::<LittleEndian>()?;
        let timestamp = cursor.read_u32::<LittleEndian>()?;

        let mut record_data = vec![0u8; data_length as usize];
        std::io::Read::read_exact(&mut cursor, &mut record_data)?;

        Ok(DnsRecord {
            data_length,
            record_type,
            version,
            rank,
            flags,
            serial,
            ttl_seconds,
            reserved,
            timestamp,
            data: record_data,
        })
    }

    /// Dynamically registered records carry a scavenging timestamp;
    /// statically created ones leave it zero.
    pub fn is_dynamic(&self) -> bool {
        self.timestamp != 0
    }

    pub fn is_tombstone(&self) -> bool {
        self.record_type == record_types::ZERO
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if self.record_type == record_types::A && self.data.len() == 4 {
            Some(Ipv4Addr::new(
                self.data[0],
                self.data[1],
                self.data[2],
                self.data[3],
            ))
        } else {
            None
        }
    }

    /// PTR data is a DNS_COUNT_NAME: total length, label count, then
    /// length-prefixed labels. Returns the target FQDN without the
    /// trailing dot.
    pub fn ptr_target(&self) -> Option<String> {
        if self.record_type != record_types::PTR || self.data.len() < 2 {
            return None;
        }

        let label_count = self.data[1] as usize;
        let mut labels = Vec::with_capacity(label_count);
        let mut index = 2;

        for _ in 0..label_count {
            if index >= self.data.len() {
                return None;
            }
            let len = self.data[index] as usize;
            index += 1;
            if index + len > self.data.len() {
                return None;
            }
            labels.push(String::from_utf8_lossy(&self.data[index..index + len]).into_owned());
            index += len;
        }

        if labels.is_empty() {
            None
        } else {
            Some(labels.join("."))
        }
    }

    /// Registration time of a dynamic record. The attribute stores hours
    /// since 1601-01-01 UTC; zero means static.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        if self.timestamp == 0 {
            return None;
        }
        let unix_secs = i64::from(self.timestamp) * 3600 - EPOCH_DELTA_SECS;
        Utc.timestamp_opt(unix_secs, 0).single()
    }
}

pub fn get_record_type_name(record_type: u16) -> &'static str {
    match record_type {
        0 => "ZERO (Tombstone)",
        1 => "A",
        2 => "NS",
        5 => "CNAME",
        6 => "SOA",
        12 => "PTR",
        28 => "AAAA",
        33 => "SRV",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn blob(record_type: u16, timestamp: u32, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(data.len() as u16).unwrap();
        buf.write_u16::<LittleEndian>(record_type).unwrap();
        buf.write_u8(5).unwrap();
        buf.write_u8(240).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(42).unwrap();
        buf.write_u32::<LittleEndian>(1200).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(timestamp).unwrap();
        buf.extend_from_slice(data);
        buf
    }

    fn count_name(fqdn: &str) -> Vec<u8> {
        let labels: Vec<&str> = fqdn.split('.').filter(|l| !l.is_empty()).collect();
        let mut name = Vec::new();
        for label in &labels {
            name.push(label.len() as u8);
            name.extend_from_slice(label.as_bytes());
        }
        name.push(0);

        let mut data = vec![name.len() as u8, labels.len() as u8];
        data.extend_from_slice(&name);
        data
    }

    #[test]
    fn parses_a_record_blob() {
        let record = DnsRecord::from_bytes(&blob(record_types::A, 3702048, &[10, 20, 30, 40])).unwrap();
        assert_eq!(record.record_type, record_types::A);
        assert_eq!(record.serial, 42);
        assert_eq!(record.ttl_seconds, 1200);
        assert_eq!(record.ipv4().unwrap().to_string(), "10.20.30.40");
        assert!(record.is_dynamic());
        assert!(!record.is_tombstone());
    }

    #[test]
    fn zero_timestamp_means_static() {
        let record = DnsRecord::from_bytes(&blob(record_types::A, 0, &[10, 0, 0, 1])).unwrap();
        assert!(!record.is_dynamic());
        assert!(record.timestamp_utc().is_none());
    }

    #[test]
    fn timestamp_converts_from_hours_since_1601() {
        let record = DnsRecord::from_bytes(&blob(record_types::A, 3702048, &[10, 0, 0, 1])).unwrap();
        let expected = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(record.timestamp_utc().unwrap(), expected);
    }

    #[test]
    fn decodes_ptr_count_name() {
        let data = count_name("web01.corp.example.com");
        let record = DnsRecord::from_bytes(&blob(record_types::PTR, 3702048, &data)).unwrap();
        assert_eq!(record.ptr_target().unwrap(), "web01.corp.example.com");
    }

    #[test]
    fn ptr_target_rejects_non_ptr_and_short_data() {
        let a = DnsRecord::from_bytes(&blob(record_types::A, 1, &[10, 0, 0, 1])).unwrap();
        assert!(a.ptr_target().is_none());

        let truncated = DnsRecord::from_bytes(&blob(record_types::PTR, 1, &[9])).unwrap();
        assert!(truncated.ptr_target().is_none());
    }

    #[test]
    fn truncated_blob_is_an_error() {
        let mut bytes = blob(record_types::A, 1, &[10, 0, 0, 1]);
        bytes.truncate(bytes.len() - 2);
        assert!(DnsRecord::from_bytes(&bytes).is_err());
    }

    #[test]
    fn tombstone_type_is_flagged() {
        let record = DnsRecord::from_bytes(&blob(record_types::ZERO, 0, &[0u8; 8])).unwrap();
        assert!(record.is_tombstone());
        assert_eq!(get_record_type_name(record.record_type), "ZERO (Tombstone)");
    }
}
