use std::path::Path;
use std::sync::Arc;

use utils::app_config::SecurityConfig;

use crate::acl::{AccessEntry, AclEntry, FileAclInfo};
use crate::backend::{create_backend, SecurityBackend};
use crate::error::{Result, SecurityError};
use crate::permissions::{AccessMask, PermissionSet};
use crate::privilege::PrivilegeGuard;
use crate::sid::Sid;

pub const DEFAULT_TAKE_OWNERSHIP_PRIVILEGE: &str = "SeTakeOwnershipPrivilege";

/// Reads and replaces the owner and DACL of filesystem objects.
///
/// Every failure is logged with the OS call that failed and its status code,
/// then handed back to the caller as a [`SecurityError`].
pub struct OwnerAclManager {
    backend: Arc<dyn SecurityBackend>,
    take_ownership_privilege: String,
}

impl OwnerAclManager {
    pub fn new(backend: Arc<dyn SecurityBackend>) -> Self {
        Self {
            backend,
            take_ownership_privilege: DEFAULT_TAKE_OWNERSHIP_PRIVILEGE.to_string(),
        }
    }

    /// Manager on the platform backend, configured from the `security` section.
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let backend = create_backend(config)?;
        Ok(Self::new(backend).with_privilege(&config.take_ownership_privilege))
    }

    /// Privilege enabled around owner changes.
    pub fn with_privilege(mut self, name: &str) -> Self {
        self.take_ownership_privilege = name.to_string();
        self
    }

    pub fn backend(&self) -> &dyn SecurityBackend {
        self.backend.as_ref()
    }

    /// Account name of the owner of `path`.
    pub fn owner_name(&self, path: &Path) -> Result<String> {
        let owner = self.backend.owner_sid(path).map_err(|e| report(path, e))?;
        self.backend
            .lookup_account_sid(&owner)
            .map_err(|e| report(path, e))
    }

    /// Make `principal` the owner of `path`.
    ///
    /// The take-ownership privilege is enabled only around the owner change
    /// and is back in its previous state when this returns.
    pub fn set_owner(&self, path: &Path, principal: &str) -> Result<()> {
        let owner = self
            .backend
            .lookup_account_name(principal)
            .map_err(|e| report(path, e))?;

        let guard = match PrivilegeGuard::acquire(self.backend.as_ref(), &self.take_ownership_privilege) {
            Ok(guard) => Some(guard),
            Err(e) => {
                // 没有特权时仍可把 owner 设为自己，继续尝试
                log::warn!("{}: continuing without {}", e, self.take_ownership_privilege);
                None
            }
        };

        let result = self.backend.replace_owner(path, &owner);
        drop(guard);

        result.map_err(|e| report(path, e))?;
        log::info!("Owner of {} set to {} ({})", path.display(), principal, owner);
        Ok(())
    }

    /// Replace the DACL of `path` with two entries: `permissions` for the
    /// current owner acting as a group, and full control for Administrators.
    pub fn set_owner_group_permissions(&self, path: &Path, permissions: PermissionSet) -> Result<()> {
        let owner = self.backend.owner_sid(path).map_err(|e| report(path, e))?;
        let administrators = self
            .backend
            .administrators_sid()
            .map_err(|e| report(path, e))?;

        let entries = Self::owner_group_entries(owner, administrators, permissions);
        self.backend
            .replace_dacl(path, &entries)
            .map_err(|e| report(path, e))?;

        log::info!(
            "DACL of {} set to owner group {} plus Administrators",
            path.display(),
            permissions
        );
        Ok(())
    }

    /// The two entries written by [`Self::set_owner_group_permissions`].
    pub fn owner_group_entries(owner: Sid, administrators: Sid, permissions: PermissionSet) -> [AccessEntry; 2] {
        [
            AccessEntry::allow_group(owner, AccessMask::from(permissions)),
            AccessEntry::allow_group(administrators, AccessMask::GENERIC_ALL),
        ]
    }

    /// Owner and DACL of `path`, with trustees resolved to account names.
    ///
    /// Trustees without an account name are reported by their SID string.
    pub fn describe(&self, path: &Path) -> Result<FileAclInfo> {
        let owner_sid = self.backend.owner_sid(path).map_err(|e| report(path, e))?;
        let owner = self.account_or_sid(&owner_sid);

        let dacl = self.backend.read_dacl(path).map_err(|e| report(path, e))?;
        let permissions = dacl
            .into_iter()
            .map(|entry| AclEntry {
                access_type: entry.access_type,
                account: self.account_or_sid(&entry.sid),
                mask: entry.mask.bits(),
                rights: entry.mask.rights_names(),
                is_inherited: entry.inherited,
                sid: entry.sid,
            })
            .collect();

        Ok(FileAclInfo {
            owner,
            owner_sid,
            permissions,
        })
    }

    fn account_or_sid(&self, sid: &Sid) -> String {
        match self.backend.lookup_account_sid(sid) {
            Ok(name) => name,
            Err(e) => {
                log::debug!("{}", e);
                sid.to_string()
            }
        }
    }
}

/// Log a failed operation on `path`; access denied is expected often enough to be a warning.
fn report(path: &Path, err: SecurityError) -> SecurityError {
    if err.is_access_denied() {
        log::warn!("{}: {}", path.display(), err);
    } else {
        log::error!("{}: {}", path.display(), err);
    }
    err
}
