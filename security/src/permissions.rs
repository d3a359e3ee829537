use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::SecurityError;

bitflags! {
    /// Capabilities requested for the owner group of a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PermissionSet: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

bitflags! {
    /// Win32 ACCESS_MASK.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AccessMask: u32 {
        const GENERIC_READ = 0x8000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_EXECUTE = 0x2000_0000;
        const GENERIC_ALL = 0x1000_0000;

        const DELETE = 0x0001_0000;
        const READ_CONTROL = 0x0002_0000;
        const WRITE_DAC = 0x0004_0000;
        const WRITE_OWNER = 0x0008_0000;
        const SYNCHRONIZE = 0x0010_0000;

        // What NTFS stores once the generic bits above are mapped.
        const FILE_GENERIC_READ = 0x0012_0089;
        const FILE_GENERIC_WRITE = 0x0012_0116;
        const FILE_GENERIC_EXECUTE = 0x0012_00A0;
        const FILE_ALL_ACCESS = 0x001F_01FF;
    }
}

impl AccessMask {
    pub fn is_full_control(&self) -> bool {
        self.contains(AccessMask::GENERIC_ALL) || self.contains(AccessMask::FILE_ALL_ACCESS)
    }

    /// Human readable rights, covering both generic and mapped file rights.
    pub fn rights_names(&self) -> Vec<String> {
        if self.is_full_control() {
            return vec!["full_control".to_string()];
        }

        let mut names = Vec::new();
        if self.contains(AccessMask::GENERIC_READ) || self.contains(AccessMask::FILE_GENERIC_READ) {
            names.push("read".to_string());
        }
        if self.contains(AccessMask::GENERIC_WRITE) || self.contains(AccessMask::FILE_GENERIC_WRITE) {
            names.push("write".to_string());
        }
        if self.contains(AccessMask::GENERIC_EXECUTE)
            || self.contains(AccessMask::FILE_GENERIC_EXECUTE)
        {
            names.push("execute".to_string());
        }
        if self.contains(AccessMask::DELETE) {
            names.push("delete".to_string());
        }
        if self.contains(AccessMask::WRITE_DAC) {
            names.push("change_permissions".to_string());
        }
        if self.contains(AccessMask::WRITE_OWNER) {
            names.push("take_ownership".to_string());
        }
        if names.is_empty() && !self.is_empty() {
            names.push(format!("0x{:08X}", self.bits()));
        }
        names
    }
}

impl From<PermissionSet> for AccessMask {
    fn from(permissions: PermissionSet) -> Self {
        let mut mask = AccessMask::empty();
        if permissions.contains(PermissionSet::READ) {
            mask |= AccessMask::GENERIC_READ;
        }
        if permissions.contains(PermissionSet::WRITE) {
            mask |= AccessMask::GENERIC_WRITE;
        }
        if permissions.contains(PermissionSet::EXECUTE) {
            mask |= AccessMask::GENERIC_EXECUTE;
        }
        mask
    }
}

/// Accepts chmod style triplets (`rw-`, `r-x`, `---`) and loose letter sets (`rx`).
impl FromStr for PermissionSet {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SecurityError::InvalidPermissions("empty permission string".to_string()));
        }

        let triplet = s.len() == 3 && s.contains('-');
        let mut permissions = PermissionSet::empty();
        for (i, c) in s.chars().enumerate() {
            let flag = match c.to_ascii_lowercase() {
                'r' if !triplet || i == 0 => PermissionSet::READ,
                'w' if !triplet || i == 1 => PermissionSet::WRITE,
                'x' if !triplet || i == 2 => PermissionSet::EXECUTE,
                '-' if triplet => continue,
                _ => return Err(SecurityError::InvalidPermissions(s.to_string())),
            };
            if permissions.contains(flag) {
                return Err(SecurityError::InvalidPermissions(s.to_string()));
            }
            permissions |= flag;
        }

        Ok(permissions)
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |flag, c| if self.contains(flag) { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            bit(PermissionSet::READ, 'r'),
            bit(PermissionSet::WRITE, 'w'),
            bit(PermissionSet::EXECUTE, 'x')
        )
    }
}
