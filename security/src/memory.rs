//! In-process principal directory and ACL store.
//!
//! Behaves like the Windows backend as far as [`crate::OwnerAclManager`] can
//! observe: the same error variants, the same call names in diagnostics, and
//! `SET_ACCESS` semantics when a DACL is built from entries.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::acl::{AccessEntry, AclAccessType};
use crate::backend::SecurityBackend;
use crate::error::{
    Result, SecurityError, ERROR_FILE_NOT_FOUND, ERROR_NONE_MAPPED, ERROR_NOT_ALL_ASSIGNED,
    ERROR_NO_SUCH_PRIVILEGE,
};
use crate::sid::Sid;

pub const SE_TAKE_OWNERSHIP_NAME: &str = "SeTakeOwnershipPrivilege";
pub const SE_RESTORE_NAME: &str = "SeRestorePrivilege";

#[derive(Debug, Clone)]
struct ObjectSecurity {
    owner: Sid,
    dacl: Vec<AccessEntry>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PrivilegeState {
    held: bool,
    enabled: bool,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<PathBuf, ObjectSecurity>,
    accounts: Vec<(String, Sid)>,
    privileges: HashMap<String, PrivilegeState>,
    history: Vec<(String, bool)>,
    locked_dacls: HashSet<PathBuf>,
    sid_alloc_failure: Option<u32>,
    acl_entries_failure: Option<u32>,
}

pub struct MemoryBackend {
    state: Mutex<State>,
    enforce_ownership: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Directory seeded with the built-in accounts; the token holds the
    /// ownership privileges, both disabled.
    pub fn new() -> Self {
        let mut state = State::default();
        state.accounts.push(("Administrators".to_string(), Sid::builtin_administrators()));
        state.accounts.push(("Users".to_string(), Sid::builtin_users()));
        state.accounts.push(("SYSTEM".to_string(), Sid::local_system()));
        for name in [SE_TAKE_OWNERSHIP_NAME, SE_RESTORE_NAME] {
            state.privileges.insert(
                name.to_string(),
                PrivilegeState {
                    held: true,
                    enabled: false,
                },
            );
        }

        Self {
            state: Mutex::new(state),
            enforce_ownership: true,
        }
    }

    /// Let any caller hand ownership to anyone, privileged or not.
    pub fn without_ownership_checks(mut self) -> Self {
        self.enforce_ownership = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // 状态只在持锁期间整体替换，poison 后的数据仍然一致
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_account(&self, name: &str, sid: Sid) {
        let mut state = self.state();
        state.accounts.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        state.accounts.push((name.to_string(), sid));
    }

    pub fn add_object(&self, path: impl AsRef<Path>, owner: Sid, dacl: Vec<AccessEntry>) {
        self.state()
            .objects
            .insert(path.as_ref().to_path_buf(), ObjectSecurity { owner, dacl });
    }

    pub fn owner_of(&self, path: impl AsRef<Path>) -> Option<Sid> {
        self.state().objects.get(path.as_ref()).map(|o| o.owner.clone())
    }

    pub fn dacl_of(&self, path: impl AsRef<Path>) -> Option<Vec<AccessEntry>> {
        self.state().objects.get(path.as_ref()).map(|o| o.dacl.clone())
    }

    /// Make DACL writes on `path` fail with access denied.
    pub fn lock_dacl(&self, path: impl AsRef<Path>) {
        self.state().locked_dacls.insert(path.as_ref().to_path_buf());
    }

    /// Make building the Administrators SID fail with `code`.
    pub fn fail_administrators_sid(&self, code: u32) {
        self.state().sid_alloc_failure = Some(code);
    }

    /// Make turning entries into an ACL fail with `code`.
    pub fn fail_acl_entries(&self, code: u32) {
        self.state().acl_entries_failure = Some(code);
    }

    /// Add or remove a privilege from the token; removing it also disables it.
    pub fn set_privilege_held(&self, name: &str, held: bool) {
        let mut state = self.state();
        let privilege = state.privileges.entry(name.to_string()).or_default();
        privilege.held = held;
        if !held {
            privilege.enabled = false;
        }
    }

    pub fn privilege_enabled(&self, name: &str) -> bool {
        self.state()
            .privileges
            .get(name)
            .is_some_and(|p| p.enabled)
    }

    /// Every state a privilege was switched to, in call order.
    pub fn privilege_history(&self, name: &str) -> Vec<bool> {
        self.state()
            .history
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, enabled)| *enabled)
            .collect()
    }

    fn can_take_ownership(state: &State) -> bool {
        [SE_TAKE_OWNERSHIP_NAME, SE_RESTORE_NAME]
            .iter()
            .any(|name| state.privileges.get(*name).is_some_and(|p| p.enabled))
    }
}

/// SetEntriesInAcl on an empty ACL: a SET_ACCESS entry discards everything
/// earlier for its trustee, a DENY_ACCESS entry discards earlier allows, and
/// deny entries come first.
pub(crate) fn build_acl(entries: &[AccessEntry]) -> Vec<AccessEntry> {
    let mut acl: Vec<AccessEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.access_type {
            AclAccessType::Allow => acl.retain(|e| e.sid != entry.sid),
            AclAccessType::Deny => {
                acl.retain(|e| !(e.sid == entry.sid && e.access_type == AclAccessType::Allow))
            }
        }
        acl.push(AccessEntry {
            inherited: false,
            ..entry.clone()
        });
    }

    let (mut denies, allows): (Vec<_>, Vec<_>) = acl
        .into_iter()
        .partition(|e| e.access_type == AclAccessType::Deny);
    denies.extend(allows);
    denies
}

impl SecurityBackend for MemoryBackend {
    fn owner_sid(&self, path: &Path) -> Result<Sid> {
        self.state()
            .objects
            .get(path)
            .map(|o| o.owner.clone())
            .ok_or_else(|| SecurityError::OwnerRead {
                path: path.to_path_buf(),
                call: "GetNamedSecurityInfoW",
                code: ERROR_FILE_NOT_FOUND,
            })
    }

    fn lookup_account_name(&self, name: &str) -> Result<Sid> {
        self.state()
            .accounts
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, sid)| sid.clone())
            .ok_or_else(|| SecurityError::PrincipalNotFound {
                name: name.to_string(),
                call: "LookupAccountNameW",
                code: ERROR_NONE_MAPPED,
            })
    }

    fn lookup_account_sid(&self, sid: &Sid) -> Result<String> {
        self.state()
            .accounts
            .iter()
            .find(|(_, s)| s == sid)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| SecurityError::SidNotMapped {
                sid: sid.to_string(),
                call: "LookupAccountSidW",
                code: ERROR_NONE_MAPPED,
            })
    }

    fn administrators_sid(&self) -> Result<Sid> {
        match self.state().sid_alloc_failure {
            Some(code) => Err(SecurityError::AclBuild {
                call: "AllocateAndInitializeSid",
                code,
            }),
            None => Ok(Sid::builtin_administrators()),
        }
    }

    fn set_privilege(&self, name: &str, enable: bool) -> Result<bool> {
        let mut guard = self.state();
        let state = &mut *guard;
        let privilege = state
            .privileges
            .get_mut(name)
            .ok_or_else(|| SecurityError::Privilege {
                privilege: name.to_string(),
                call: "LookupPrivilegeValueW",
                code: ERROR_NO_SUCH_PRIVILEGE,
            })?;

        if enable && !privilege.held {
            return Err(SecurityError::Privilege {
                privilege: name.to_string(),
                call: "AdjustTokenPrivileges",
                code: ERROR_NOT_ALL_ASSIGNED,
            });
        }

        let previous = privilege.enabled;
        privilege.enabled = enable;
        state.history.push((name.to_string(), enable));

        Ok(previous)
    }

    fn replace_owner(&self, path: &Path, owner: &Sid) -> Result<()> {
        let mut state = self.state();
        let allowed = !self.enforce_ownership || Self::can_take_ownership(&state);

        let object = state
            .objects
            .get_mut(path)
            .ok_or_else(|| SecurityError::apply_failed(path, "SetNamedSecurityInfoW", ERROR_FILE_NOT_FOUND))?;

        if object.owner != *owner && !allowed {
            return Err(SecurityError::AccessDenied {
                path: path.to_path_buf(),
                call: "SetNamedSecurityInfoW",
            });
        }

        object.owner = owner.clone();
        Ok(())
    }

    fn replace_dacl(&self, path: &Path, entries: &[AccessEntry]) -> Result<()> {
        let mut state = self.state();
        if let Some(code) = state.acl_entries_failure {
            return Err(SecurityError::AclBuild {
                call: "SetEntriesInAclW",
                code,
            });
        }
        let acl = build_acl(entries);

        if state.locked_dacls.contains(path) {
            return Err(SecurityError::AccessDenied {
                path: path.to_path_buf(),
                call: "SetNamedSecurityInfoW",
            });
        }

        let object = state
            .objects
            .get_mut(path)
            .ok_or_else(|| SecurityError::apply_failed(path, "SetNamedSecurityInfoW", ERROR_FILE_NOT_FOUND))?;
        object.dacl = acl;

        Ok(())
    }

    fn read_dacl(&self, path: &Path) -> Result<Vec<AccessEntry>> {
        self.state()
            .objects
            .get(path)
            .map(|o| o.dacl.clone())
            .ok_or_else(|| SecurityError::DaclRead {
                path: path.to_path_buf(),
                call: "GetNamedSecurityInfoW",
                code: ERROR_FILE_NOT_FOUND,
            })
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
