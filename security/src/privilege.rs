use crate::backend::SecurityBackend;
use crate::error::Result;

/// Keeps a process privilege enabled for as long as the guard lives.
///
/// Dropping the guard puts the privilege back into the state it had when the
/// guard was acquired, on success and error paths alike.
pub struct PrivilegeGuard<'a> {
    backend: &'a dyn SecurityBackend,
    name: String,
    was_enabled: bool,
}

impl<'a> PrivilegeGuard<'a> {
    pub fn acquire(backend: &'a dyn SecurityBackend, name: &str) -> Result<Self> {
        let was_enabled = backend.set_privilege(name, true)?;
        log::debug!("Enabled privilege {} (previously enabled: {})", name, was_enabled);

        Ok(Self {
            backend,
            name: name.to_string(),
            was_enabled,
        })
    }
}

impl Drop for PrivilegeGuard<'_> {
    fn drop(&mut self) {
        if self.was_enabled {
            return;
        }
        match self.backend.set_privilege(&self.name, false) {
            Ok(_) => log::debug!("Disabled privilege {}", self.name),
            Err(e) => log::error!("Could not disable privilege {}: {}", self.name, e),
        }
    }
}
