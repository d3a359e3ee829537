use std::path::PathBuf;

use thiserror::Error;

/// Status code the OS reports when the caller lacks the rights for a call.
pub const ERROR_ACCESS_DENIED: u32 = 5;
/// Status code for "no mapping between account names and security IDs".
pub const ERROR_NONE_MAPPED: u32 = 1332;
/// Status code for a path that does not exist.
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
/// Status code for a malformed argument.
pub const ERROR_INVALID_PARAMETER: u32 = 87;
/// Status code for an allocation the OS could not satisfy.
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
/// Status code for an unknown privilege name.
pub const ERROR_NO_SUCH_PRIVILEGE: u32 = 1313;
/// Status code for a privilege the token does not hold.
pub const ERROR_NOT_ALL_ASSIGNED: u32 = 1300;

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Principal not found: {name} ({call}() failed: {code})")]
    PrincipalNotFound {
        name: String,
        call: &'static str,
        code: u32,
    },

    #[error("No account name for {sid}: {call}() failed: {code}")]
    SidNotMapped {
        sid: String,
        call: &'static str,
        code: u32,
    },

    #[error("Could not read owner of {path}: {call}() failed: {code}", path = .path.display())]
    OwnerRead {
        path: PathBuf,
        call: &'static str,
        code: u32,
    },

    #[error("Could not read DACL of {path}: {call}() failed: {code}", path = .path.display())]
    DaclRead {
        path: PathBuf,
        call: &'static str,
        code: u32,
    },

    #[error("Could not build ACL: {call}() failed: {code}")]
    AclBuild { call: &'static str, code: u32 },

    #[error("Access denied on {path}: {call}() failed: {code}", path = .path.display(), code = ERROR_ACCESS_DENIED)]
    AccessDenied { path: PathBuf, call: &'static str },

    #[error("Could not apply security info to {path}: {call}() failed: {code}", path = .path.display())]
    Apply {
        path: PathBuf,
        call: &'static str,
        code: u32,
    },

    #[error("Privilege {privilege}: {call}() failed: {code}")]
    Privilege {
        privilege: String,
        call: &'static str,
        code: u32,
    },

    #[error("Invalid SID: {0}")]
    InvalidSid(String),

    #[error("Invalid permission set: {0}")]
    InvalidPermissions(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl SecurityError {
    /// True when the OS refused the call for lack of rights.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, SecurityError::AccessDenied { .. })
    }

    /// The OS status code carried by this error, if it came from an OS call.
    pub fn code(&self) -> Option<u32> {
        match self {
            SecurityError::PrincipalNotFound { code, .. }
            | SecurityError::SidNotMapped { code, .. }
            | SecurityError::OwnerRead { code, .. }
            | SecurityError::DaclRead { code, .. }
            | SecurityError::AclBuild { code, .. }
            | SecurityError::Apply { code, .. }
            | SecurityError::Privilege { code, .. } => Some(*code),
            SecurityError::AccessDenied { .. } => Some(ERROR_ACCESS_DENIED),
            _ => None,
        }
    }

    /// Build the error for a failed call that wrote to `path`.
    pub fn apply_failed(path: &std::path::Path, call: &'static str, code: u32) -> Self {
        if code == ERROR_ACCESS_DENIED {
            SecurityError::AccessDenied {
                path: path.to_path_buf(),
                call,
            }
        } else {
            SecurityError::Apply {
                path: path.to_path_buf(),
                call,
                code,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn access_denied_is_distinguishable() {
        let err = SecurityError::apply_failed(Path::new("C:\\data"), "SetNamedSecurityInfoW", 5);
        assert!(err.is_access_denied());
        assert_eq!(err.code(), Some(ERROR_ACCESS_DENIED));

        let err = SecurityError::apply_failed(Path::new("C:\\data"), "SetNamedSecurityInfoW", ERROR_INVALID_PARAMETER);
        assert!(!err.is_access_denied());
        assert_eq!(err.code(), Some(ERROR_INVALID_PARAMETER));
    }

    #[test]
    fn message_names_call_and_code() {
        let err = SecurityError::OwnerRead {
            path: PathBuf::from("/tmp/x"),
            call: "GetNamedSecurityInfoW",
            code: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("GetNamedSecurityInfoW()"));
        assert!(msg.contains(": 2"));

        let denied = SecurityError::AccessDenied {
            path: PathBuf::from("/tmp/x"),
            call: "SetNamedSecurityInfoW",
        };
        assert!(denied.to_string().ends_with("failed: 5"));
    }
}
