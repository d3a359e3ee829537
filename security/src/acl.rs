//! ACL value types: the entries a backend reads and writes, and the
//! serialisable report built from them.

use serde::{Deserialize, Serialize};

use crate::permissions::AccessMask;
use crate::sid::Sid;

/// ACL access type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAccessType {
    Allow,
    Deny,
}

/// How the trustee of an entry is presented to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrusteeKind {
    User,
    Group,
    Unknown,
}

/// One access-control entry as the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    pub sid: Sid,
    pub trustee: TrusteeKind,
    pub mask: AccessMask,
    pub access_type: AclAccessType,
    pub inherited: bool,
}

impl AccessEntry {
    /// Explicit, non-inherited allow entry for a group trustee.
    pub fn allow_group(sid: Sid, mask: AccessMask) -> Self {
        Self {
            sid,
            trustee: TrusteeKind::Group,
            mask,
            access_type: AclAccessType::Allow,
            inherited: false,
        }
    }
}

/// File ACL information structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAclInfo {
    pub owner: String,
    pub owner_sid: Sid,
    pub permissions: Vec<AclEntry>,
}

/// ACL entry structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclEntry {
    pub access_type: AclAccessType,
    pub account: String,
    pub sid: Sid,
    pub mask: u32,
    pub rights: Vec<String>,
    pub is_inherited: bool,
}

impl FileAclInfo {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl std::fmt::Display for FileAclInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "owner: {} ({})", self.owner, self.owner_sid)?;
        for entry in &self.permissions {
            let access = match entry.access_type {
                AclAccessType::Allow => "allow",
                AclAccessType::Deny => "deny",
            };
            write!(f, "  {:<5} {} [{}]", access, entry.account, entry.rights.join(","))?;
            if entry.is_inherited {
                write!(f, " (inherited)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileAclInfo {
        FileAclInfo {
            owner: "Alice".to_string(),
            owner_sid: "S-1-5-21-1-2-3-1001".parse().unwrap(),
            permissions: vec![
                AclEntry {
                    access_type: AclAccessType::Allow,
                    account: "Alice".to_string(),
                    sid: "S-1-5-21-1-2-3-1001".parse().unwrap(),
                    mask: AccessMask::GENERIC_READ.bits(),
                    rights: vec!["read".to_string()],
                    is_inherited: false,
                },
                AclEntry {
                    access_type: AclAccessType::Allow,
                    account: "Administrators".to_string(),
                    sid: Sid::builtin_administrators(),
                    mask: AccessMask::GENERIC_ALL.bits(),
                    rights: vec!["full_control".to_string()],
                    is_inherited: true,
                },
            ],
        }
    }

    #[test]
    fn json_report_uses_sid_strings() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"owner_sid\": \"S-1-5-21-1-2-3-1001\""));
        assert!(json.contains("\"access_type\": \"allow\""));

        let back: FileAclInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn text_report_lists_every_entry() {
        let text = sample().to_string();
        assert!(text.starts_with("owner: Alice (S-1-5-21-1-2-3-1001)"));
        assert!(text.contains("allow Alice [read]"));
        assert!(text.contains("allow Administrators [full_control] (inherited)"));
    }
}
