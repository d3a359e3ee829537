use std::path::Path;
use std::sync::Arc;

use utils::app_config::SecurityConfig;

use crate::acl::AccessEntry;
use crate::error::Result;
use crate::sid::Sid;

/// Operating system facilities used by [`crate::OwnerAclManager`]: the
/// principal directory, the per-object security store and process privileges.
///
/// Every call owns whatever the OS allocates for it and releases it before
/// returning; nothing is cached between calls.
pub trait SecurityBackend: Send + Sync {
    /// Owner SID of the object at `path`.
    fn owner_sid(&self, path: &Path) -> Result<Sid>;

    /// Resolve an account name to its SID.
    fn lookup_account_name(&self, name: &str) -> Result<Sid>;

    /// Resolve a SID to its account name.
    fn lookup_account_sid(&self, sid: &Sid) -> Result<String>;

    /// SID of the built-in Administrators group.
    fn administrators_sid(&self) -> Result<Sid>;

    /// Enable or disable a process privilege, returning whether it was enabled before.
    fn set_privilege(&self, name: &str, enable: bool) -> Result<bool>;

    /// Replace the owner of the object at `path`.
    fn replace_owner(&self, path: &Path, owner: &Sid) -> Result<()>;

    /// Replace the DACL of the object at `path` with exactly `entries`.
    fn replace_dacl(&self, path: &Path, entries: &[AccessEntry]) -> Result<()>;

    /// Entries of the DACL currently set on the object at `path`.
    fn read_dacl(&self, path: &Path) -> Result<Vec<AccessEntry>>;

    fn backend_type(&self) -> &'static str;
}

/// 根据平台创建安全后端实例
#[cfg(windows)]
pub fn create_backend(config: &SecurityConfig) -> Result<Arc<dyn SecurityBackend>> {
    let system_name = Some(config.system_name.as_str()).filter(|s| !s.is_empty());
    let backend = crate::windows::WindowsBackend::new(system_name);
    Ok(Arc::new(backend) as Arc<dyn SecurityBackend>)
}

/// 根据平台创建安全后端实例
#[cfg(not(windows))]
pub fn create_backend(_config: &SecurityConfig) -> Result<Arc<dyn SecurityBackend>> {
    Err(crate::error::SecurityError::Unsupported(format!(
        "file ownership and DACLs need the Windows security API, not available on {}",
        std::env::consts::OS
    )))
}
