//! Owner and DACL management for filesystem objects.
//!
//! [`OwnerAclManager`] talks to the operating system through the
//! [`SecurityBackend`] trait. On Windows the backend is [`WindowsBackend`];
//! [`MemoryBackend`] keeps the same contract in process memory.

pub mod acl;
pub mod backend;
pub mod error;
pub mod manager;
pub mod memory;
pub mod permissions;
pub mod privilege;
pub mod sid;
#[cfg(windows)]
pub mod windows;

pub use acl::*;
pub use backend::{create_backend, SecurityBackend};
pub use error::{Result, SecurityError};
pub use manager::OwnerAclManager;
pub use memory::MemoryBackend;
pub use permissions::{AccessMask, PermissionSet};
pub use privilege::PrivilegeGuard;
pub use sid::Sid;
#[cfg(windows)]
pub use windows::WindowsBackend;
