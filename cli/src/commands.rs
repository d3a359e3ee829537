use std::path::Path;

use security::{OwnerAclManager, PermissionSet, SecurityError};
use utils::app_config::AppConfig;
use utils::error::{Error, Result};

fn command_error(err: SecurityError) -> Error {
    Error::Command(err.to_string())
}

/// Manager errors are logged with their call and status code where they
/// happen; only the failed command is reported again.
fn failed(command: &'static str) -> impl Fn(SecurityError) -> Error {
    move |err| {
        log::debug!("{} failed: {:?}", command, err);
        Error::Failed(command)
    }
}

fn manager() -> Result<OwnerAclManager> {
    let config = AppConfig::fetch()?;
    let manager = OwnerAclManager::from_config(&config.security).map_err(command_error)?;
    log::debug!("Using {} security backend", manager.backend().backend_type());
    Ok(manager)
}

pub fn owner_cmd(path: &Path) -> Result<()> {
    let owner = manager()?.owner_name(path).map_err(failed("owner"))?;
    println!("{}", owner);
    Ok(())
}

pub fn set_owner_cmd(path: &Path, account: &str) -> Result<()> {
    manager()?.set_owner(path, account).map_err(failed("set-owner"))?;
    println!("Owner of {} set to {}", path.display(), account);
    Ok(())
}

pub fn grant_cmd(path: &Path, permissions: PermissionSet) -> Result<()> {
    manager()?
        .set_owner_group_permissions(path, permissions)
        .map_err(failed("grant"))?;
    println!("Permissions of {} set to owner {} + Administrators full control", path.display(), permissions);
    Ok(())
}

pub fn show_cmd(path: &Path, json: bool) -> Result<()> {
    let info = manager()?.describe(path).map_err(failed("show"))?;
    if json {
        println!("{}", info.to_json().map_err(command_error)?);
    } else {
        print!("{}", info);
    }
    Ok(())
}
