//! Owned security identifiers.
//!
//! A SID is kept in its binary form: revision, sub-authority count, a 48-bit
//! big-endian identifier authority and up to 15 little-endian sub-authorities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SecurityError;

pub const SID_REVISION: u8 = 1;
pub const SID_MAX_SUB_AUTHORITIES: usize = 15;
const SID_HEADER_LEN: usize = 8;

/// SECURITY_NT_AUTHORITY
pub const NT_AUTHORITY: u64 = 5;
/// SECURITY_BUILTIN_DOMAIN_RID
pub const BUILTIN_DOMAIN_RID: u32 = 32;
/// DOMAIN_ALIAS_RID_ADMINS
pub const ALIAS_RID_ADMINS: u32 = 544;
/// DOMAIN_ALIAS_RID_USERS
pub const ALIAS_RID_USERS: u32 = 545;
/// SECURITY_LOCAL_SYSTEM_RID
pub const LOCAL_SYSTEM_RID: u32 = 18;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sid(Vec<u8>);

impl Sid {
    /// Build a SID from an identifier authority and its sub-authorities.
    pub fn new(authority: u64, sub_authorities: &[u32]) -> Result<Self, SecurityError> {
        if authority >= 1 << 48 {
            return Err(SecurityError::InvalidSid(format!(
                "authority {} does not fit in 48 bits",
                authority
            )));
        }
        if sub_authorities.len() > SID_MAX_SUB_AUTHORITIES {
            return Err(SecurityError::InvalidSid(format!(
                "{} sub-authorities, at most {} allowed",
                sub_authorities.len(),
                SID_MAX_SUB_AUTHORITIES
            )));
        }

        let mut bytes = Vec::with_capacity(SID_HEADER_LEN + 4 * sub_authorities.len());
        bytes.push(SID_REVISION);
        bytes.push(sub_authorities.len() as u8);
        bytes.extend_from_slice(&authority.to_be_bytes()[2..]);
        for sub in sub_authorities {
            bytes.extend_from_slice(&sub.to_le_bytes());
        }

        Ok(Sid(bytes))
    }

    /// Copy a SID out of its binary representation, validating the layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SecurityError> {
        if bytes.len() < SID_HEADER_LEN {
            return Err(SecurityError::InvalidSid(format!(
                "{} bytes is shorter than a SID header",
                bytes.len()
            )));
        }
        if bytes[0] != SID_REVISION {
            return Err(SecurityError::InvalidSid(format!(
                "unknown revision {}",
                bytes[0]
            )));
        }

        let count = bytes[1] as usize;
        if count > SID_MAX_SUB_AUTHORITIES {
            return Err(SecurityError::InvalidSid(format!(
                "{} sub-authorities, at most {} allowed",
                count, SID_MAX_SUB_AUTHORITIES
            )));
        }
        if bytes.len() != SID_HEADER_LEN + 4 * count {
            return Err(SecurityError::InvalidSid(format!(
                "length {} does not match {} sub-authorities",
                bytes.len(),
                count
            )));
        }

        Ok(Sid(bytes.to_vec()))
    }

    /// BUILTIN\Administrators (S-1-5-32-544).
    pub fn builtin_administrators() -> Self {
        Self::well_known(&[BUILTIN_DOMAIN_RID, ALIAS_RID_ADMINS])
    }

    /// BUILTIN\Users (S-1-5-32-545).
    pub fn builtin_users() -> Self {
        Self::well_known(&[BUILTIN_DOMAIN_RID, ALIAS_RID_USERS])
    }

    /// NT AUTHORITY\SYSTEM (S-1-5-18).
    pub fn local_system() -> Self {
        Self::well_known(&[LOCAL_SYSTEM_RID])
    }

    fn well_known(sub_authorities: &[u32]) -> Self {
        let mut bytes = vec![SID_REVISION, sub_authorities.len() as u8, 0, 0, 0, 0, 0, NT_AUTHORITY as u8];
        for sub in sub_authorities {
            bytes.extend_from_slice(&sub.to_le_bytes());
        }
        Sid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn authority(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw[2..].copy_from_slice(&self.0[2..SID_HEADER_LEN]);
        u64::from_be_bytes(raw)
    }

    pub fn sub_authorities(&self) -> Vec<u32> {
        self.0[SID_HEADER_LEN..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// The last sub-authority (the relative identifier), if any.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities().last().copied()
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0[0])?;

        // Windows prints authorities that do not fit in 32 bits as hex
        let authority = self.authority();
        if authority >= 1 << 32 {
            write!(f, "-0x{:012X}", authority)?;
        } else {
            write!(f, "-{}", authority)?;
        }

        for sub in self.sub_authorities() {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({})", self)
    }
}

impl FromStr for Sid {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SecurityError::InvalidSid(s.to_string());

        let mut parts = s.trim().split('-');
        if !parts.next().is_some_and(|p| p.eq_ignore_ascii_case("S")) {
            return Err(invalid());
        }

        let revision: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        if revision != SID_REVISION {
            return Err(invalid());
        }

        let authority = parts.next().ok_or_else(invalid)?;
        let authority = match authority
            .strip_prefix("0x")
            .or_else(|| authority.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => authority.parse::<u64>(),
        }
        .map_err(|_| invalid())?;

        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        Sid::new(authority, &sub_authorities)
    }
}

impl TryFrom<String> for Sid {
    type Error = SecurityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Sid> for String {
    fn from(sid: Sid) -> Self {
        sid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_administrators_layout() {
        let sid = Sid::builtin_administrators();
        assert_eq!(
            sid.as_bytes(),
            &[1, 2, 0, 0, 0, 0, 0, 5, 32, 0, 0, 0, 0x20, 0x02, 0, 0]
        );
        assert_eq!(sid.to_string(), "S-1-5-32-544");
        assert_eq!(sid.rid(), Some(544));
    }

    #[test]
    fn parse_domain_user() {
        let sid: Sid = "S-1-5-21-3623811015-3361044348-30300820-1013".parse().unwrap();
        assert_eq!(sid.authority(), 5);
        assert_eq!(sid.sub_authorities(), vec![21, 3623811015, 3361044348, 30300820, 1013]);
        assert_eq!(sid.to_string(), "S-1-5-21-3623811015-3361044348-30300820-1013");
        assert_eq!(Sid::from_bytes(sid.as_bytes()).unwrap(), sid);
    }

    #[test]
    fn large_authority_prints_as_hex() {
        let sid = Sid::new(0x1_0000_0000, &[7]).unwrap();
        assert_eq!(sid.to_string(), "S-1-0x000100000000-7");
        assert_eq!("S-1-0x000100000000-7".parse::<Sid>().unwrap(), sid);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("".parse::<Sid>().is_err());
        assert!("X-1-5-18".parse::<Sid>().is_err());
        assert!("S-2-5-18".parse::<Sid>().is_err());
        assert!("S-1-5-abc".parse::<Sid>().is_err());
        assert!("S-1-5-1-2-3-4-5-6-7-8-9-10-11-12-13-14-15-16".parse::<Sid>().is_err());

        assert!(Sid::from_bytes(&[1, 1, 0, 0, 0, 0, 0, 5]).is_err());
        assert!(Sid::from_bytes(&[2, 0, 0, 0, 0, 0, 0, 5]).is_err());
    }

    #[test]
    fn well_known_sids_match_parsed_form() {
        assert_eq!(Sid::local_system(), "S-1-5-18".parse().unwrap());
        assert_eq!(Sid::builtin_users(), "S-1-5-32-545".parse().unwrap());
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Sid::local_system()).unwrap();
        assert_eq!(json, "\"S-1-5-18\"");
        let back: Sid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Sid::local_system());
    }
}
