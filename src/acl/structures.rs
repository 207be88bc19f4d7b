use ldap3::controls::RawControl;
use std::fmt;
use std::io::{Cursor, Read};

/// LDAP_SERVER_SD_FLAGS_OID, scopes which parts of a security descriptor
/// a read or write touches.
pub const SD_FLAGS_OID: &str = "1.2.840.113556.1.4.801";

pub const OWNER_SECURITY_INFORMATION: u32 = 0x01;
pub const GROUP_SECURITY_INFORMATION: u32 = 0x02;
pub const DACL_SECURITY_INFORMATION: u32 = 0x04;

const SE_SELF_RELATIVE: u16 = 0x8000;
const SD_HEADER_LEN: usize = 20;

#[derive(Debug)]
pub struct SecurityDescriptor {
    pub control: u16,
    pub owner_sid: Option<LdapSid>,
    pub group_sid: Option<LdapSid>,
}

impl SecurityDescriptor {
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        let mut cursor = Cursor::new(data);

        let mut revision = [0u8; 1];
        let mut sbz1 = [0u8; 1];
        let mut control = [0u8; 2];
        let mut offset_owner = [0u8; 4];
        let mut offset_group = [0u8; 4];
        let mut offset_sacl = [0u8; 4];
        let mut offset_dacl = [0u8; 4];

        cursor
            .read_exact(&mut revision)
            .map_err(|e| e.to_string())?;
        cursor.read_exact(&mut sbz1).map_err(|e| e.to_string())?;
        cursor.read_exact(&mut control).map_err(|e| e.to_string())?;
        cursor
            .read_exact(&mut offset_owner)
            .map_err(|e| e.to_string())?;
        cursor
            .read_exact(&mut offset_group)
            .map_err(|e| e.to_string())?;
        cursor
            .read_exact(&mut offset_sacl)
            .map_err(|e| e.to_string())?;
        cursor
            .read_exact(&mut offset_dacl)
            .map_err(|e| e.to_string())?;

        let control = u16::from_le_bytes(control);
        let offset_owner = u32::from_le_bytes(offset_owner) as usize;
        let offset_group = u32::from_le_bytes(offset_group) as usize;

        let owner_sid = if offset_owner != 0 && offset_owner < data.len() {
            Some(LdapSid::from_bytes(&data[offset_owner..])?)
        } else {
            None
        };

        let group_sid = if offset_group != 0 && offset_group < data.len() {
            Some(LdapSid::from_bytes(&data[offset_group..])?)
        } else {
            None
        };

        Ok(SecurityDescriptor {
            control,
            owner_sid,
            group_sid,
        })
    }

    /// Descriptor carrying nothing but an owner, for owner-scoped writes
    /// under the SD-flags control.
    pub fn owner_only(owner: LdapSid) -> Self {
        SecurityDescriptor {
            control: SE_SELF_RELATIVE,
            owner_sid: Some(owner),
            group_sid: None,
        }
    }

    /// Self-relative serialization. Only owner and group are ever written;
    /// this tool never authors a DACL or SACL.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut offset_owner = 0u32;
        let mut offset_group = 0u32;

        if let Some(owner) = &self.owner_sid {
            offset_owner = SD_HEADER_LEN as u32;
            body.extend_from_slice(&owner.to_bytes());
        }
        if let Some(group) = &self.group_sid {
            offset_group = SD_HEADER_LEN as u32 + body.len() as u32;
            body.extend_from_slice(&group.to_bytes());
        }

        let mut buf = Vec::with_capacity(SD_HEADER_LEN + body.len());
        buf.push(1); // revision
        buf.push(0); // sbz1
        buf.extend_from_slice(&(self.control | SE_SELF_RELATIVE).to_le_bytes());
        buf.extend_from_slice(&offset_owner.to_le_bytes());
        buf.extend_from_slice(&offset_group.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // sacl
        buf.extend_from_slice(&0u32.to_le_bytes()); // dacl
        buf.extend_from_slice(&body);
        buf
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapSid {
    pub revision: u8,
    pub sub_authority_count: u8,
    pub identifier_authority: [u8; 6],
    pub sub_authorities: Vec<u32>,
}

impl LdapSid {
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        if data.len() < 8 {
            return Err("Data too short for SID".to_string());
        }

        let revision = data[0];
        let sub_authority_count = data[1];
        let mut identifier_authority = [0u8; 6];
        identifier_authority.copy_from_slice(&data[2..8]);

        let mut sub_authorities = Vec::new();
        let mut offset = 8;
        for _ in 0..sub_authority_count {
            if offset + 4 > data.len() {
                return Err("Data too short for sub authorities".to_string());
            }
            let sub_auth = u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            sub_authorities.push(sub_auth);
            offset += 4;
        }

        Ok(LdapSid {
            revision,
            sub_authority_count,
            identifier_authority,
            sub_authorities,
        })
    }

    /// Parse the textual `S-1-...` form back into the binary structure.
    pub fn parse(sid: &str) -> Result<Self, String> {
        let parts: Vec<&str> = sid.split('-').collect();
        if parts.len() < 3 || parts[0] != "S" {
            return Err(format!("Invalid SID format: {}", sid));
        }

        let revision = parts[1]
            .parse::<u8>()
            .map_err(|_| format!("Invalid SID revision: {}", parts[1]))?;
        let authority = parts[2]
            .parse::<u64>()
            .map_err(|_| format!("Invalid SID authority: {}", parts[2]))?;

        let mut identifier_authority = [0u8; 6];
        identifier_authority.copy_from_slice(&authority.to_be_bytes()[2..]);

        let mut sub_authorities = Vec::new();
        for part in &parts[3..] {
            let sub_auth = part
                .parse::<u32>()
                .map_err(|_| format!("Invalid SID sub authority: {}", part))?;
            sub_authorities.push(sub_auth);
        }

        Ok(LdapSid {
            revision,
            sub_authority_count: sub_authorities.len() as u8,
            identifier_authority,
            sub_authorities,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 4 * self.sub_authorities.len());
        buf.push(self.revision);
        buf.push(self.sub_authorities.len() as u8);
        buf.extend_from_slice(&self.identifier_authority);
        for sub_auth in &self.sub_authorities {
            buf.extend_from_slice(&sub_auth.to_le_bytes());
        }
        buf
    }

    /// Binary form escaped for use inside an LDAP filter, e.g.
    /// `(objectSid=\01\05\00...)`.
    pub fn to_ldap_filter(&self) -> String {
        self.to_bytes()
            .iter()
            .map(|byte| format!("\\{:02X}", byte))
            .collect()
    }
}

impl fmt::Display for LdapSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authority_value = u64::from_be_bytes([
            0,
            0,
            self.identifier_authority[0],
            self.identifier_authority[1],
            self.identifier_authority[2],
            self.identifier_authority[3],
            self.identifier_authority[4],
            self.identifier_authority[5],
        ]);

        write!(f, "S-{}-{}", self.revision, authority_value)?;
        for sub_auth in &self.sub_authorities {
            write!(f, "-{}", sub_auth)?;
        }
        Ok(())
    }
}

/// Build the SD-flags control for the given SECURITY_INFORMATION bits.
/// The value is BER: SEQUENCE { INTEGER flags }.
pub fn sd_flags_control(flags: u32) -> RawControl {
    let mut int_bytes: Vec<u8> = flags
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|b| *b == 0)
        .collect();
    if int_bytes.is_empty() {
        int_bytes.push(0);
    }
    if int_bytes[0] & 0x80 != 0 {
        int_bytes.insert(0, 0);
    }

    let mut val = Vec::with_capacity(int_bytes.len() + 4);
    val.push(0x30);
    val.push((int_bytes.len() + 2) as u8);
    val.push(0x02);
    val.push(int_bytes.len() as u8);
    val.extend_from_slice(&int_bytes);

    RawControl {
        ctype: SD_FLAGS_OID.to_string(),
        crit: true,
        val: Some(val),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sid() -> LdapSid {
        LdapSid::parse("S-1-5-21-1004336348-1177238915-682003330-1103").unwrap()
    }

    #[test]
    fn sid_string_round_trip() {
        let sid = sample_sid();
        assert_eq!(
            sid.to_string(),
            "S-1-5-21-1004336348-1177238915-682003330-1103"
        );
        assert_eq!(LdapSid::from_bytes(&sid.to_bytes()).unwrap(), sid);
    }

    #[test]
    fn sid_rejects_garbage() {
        assert!(LdapSid::parse("not-a-sid").is_err());
        assert!(LdapSid::parse("S-1").is_err());
        assert!(LdapSid::from_bytes(&[1, 1, 0]).is_err());
    }

    #[test]
    fn sid_filter_escaping() {
        let sid = LdapSid::parse("S-1-5-18").unwrap();
        // revision 1, one subauthority, NT authority (5), subauth 18 LE
        assert_eq!(sid.to_ldap_filter(), "\\01\\01\\00\\00\\00\\00\\00\\05\\12\\00\\00\\00");
    }

    #[test]
    fn owner_only_descriptor_round_trip() {
        let sid = sample_sid();
        let bytes = SecurityDescriptor::owner_only(sid.clone()).to_bytes();
        let parsed = SecurityDescriptor::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.owner_sid, Some(sid));
        assert_eq!(parsed.group_sid, None);
    }

    #[test]
    fn owner_only_bytes_are_deterministic() {
        // The remediator's idempotence rests on this being a pure function.
        let a = SecurityDescriptor::owner_only(sample_sid()).to_bytes();
        let b = SecurityDescriptor::owner_only(sample_sid()).to_bytes();
        assert_eq!(a, b);
    }

    #[test]
    fn descriptor_without_owner() {
        let sd = SecurityDescriptor {
            control: 0,
            owner_sid: None,
            group_sid: None,
        };
        let parsed = SecurityDescriptor::from_bytes(&sd.to_bytes()).unwrap();
        assert!(parsed.owner_sid.is_none());
    }

    #[test]
    fn sd_flags_control_encoding() {
        let ctrl = sd_flags_control(OWNER_SECURITY_INFORMATION);
        assert_eq!(ctrl.ctype, SD_FLAGS_OID);
        assert!(ctrl.crit);
        assert_eq!(ctrl.val, Some(vec![0x30, 0x03, 0x02, 0x01, 0x01]));

        let ctrl = sd_flags_control(
            OWNER_SECURITY_INFORMATION | GROUP_SECURITY_INFORMATION | DACL_SECURITY_INFORMATION,
        );
        assert_eq!(ctrl.val, Some(vec![0x30, 0x03, 0x02, 0x01, 0x07]));
    }
}
