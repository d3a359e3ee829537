//! Windows security API backend.
//!
//! Every buffer the OS hands out is wrapped in an owner that releases it on
//! drop, and SIDs are copied into [`Sid`] before their buffer goes away.

use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr::null_mut;

use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::Foundation::LocalFree;
use windows_sys::Win32::Foundation::ERROR_INSUFFICIENT_BUFFER;
use windows_sys::Win32::Foundation::ERROR_SUCCESS;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::HLOCAL;
use windows_sys::Win32::Foundation::LUID;
use windows_sys::Win32::Security::AclSizeInformation;
use windows_sys::Win32::Security::AdjustTokenPrivileges;
use windows_sys::Win32::Security::AllocateAndInitializeSid;
use windows_sys::Win32::Security::Authorization::GetNamedSecurityInfoW;
use windows_sys::Win32::Security::Authorization::SetEntriesInAclW;
use windows_sys::Win32::Security::Authorization::SetNamedSecurityInfoW;
use windows_sys::Win32::Security::Authorization::EXPLICIT_ACCESS_W;
use windows_sys::Win32::Security::Authorization::TRUSTEE_IS_GROUP;
use windows_sys::Win32::Security::Authorization::TRUSTEE_IS_SID;
use windows_sys::Win32::Security::Authorization::TRUSTEE_IS_UNKNOWN;
use windows_sys::Win32::Security::Authorization::TRUSTEE_IS_USER;
use windows_sys::Win32::Security::Authorization::TRUSTEE_W;
use windows_sys::Win32::Security::FreeSid;
use windows_sys::Win32::Security::GetAce;
use windows_sys::Win32::Security::GetAclInformation;
use windows_sys::Win32::Security::GetLengthSid;
use windows_sys::Win32::Security::IsValidSid;
use windows_sys::Win32::Security::LookupAccountNameW;
use windows_sys::Win32::Security::LookupAccountSidW;
use windows_sys::Win32::Security::LookupPrivilegeValueW;
use windows_sys::Win32::Security::ACCESS_ALLOWED_ACE;
use windows_sys::Win32::Security::ACE_HEADER;
use windows_sys::Win32::Security::ACL;
use windows_sys::Win32::Security::ACL_SIZE_INFORMATION;
use windows_sys::Win32::Security::DACL_SECURITY_INFORMATION;
use windows_sys::Win32::Security::LUID_AND_ATTRIBUTES;
use windows_sys::Win32::Security::OWNER_SECURITY_INFORMATION;
use windows_sys::Win32::Security::PROTECTED_DACL_SECURITY_INFORMATION;
use windows_sys::Win32::Security::SE_PRIVILEGE_ENABLED;
use windows_sys::Win32::Security::SID_IDENTIFIER_AUTHORITY;
use windows_sys::Win32::Security::TOKEN_ADJUST_PRIVILEGES;
use windows_sys::Win32::Security::TOKEN_PRIVILEGES;
use windows_sys::Win32::Security::TOKEN_QUERY;
use windows_sys::Win32::System::Threading::GetCurrentProcess;
use windows_sys::Win32::System::Threading::OpenProcessToken;

use crate::acl::{AccessEntry, AclAccessType, TrusteeKind};
use crate::backend::SecurityBackend;
use crate::error::{Result, SecurityError, ERROR_NONE_MAPPED, ERROR_NOT_ALL_ASSIGNED};
use crate::permissions::AccessMask;
use crate::sid::{Sid, ALIAS_RID_ADMINS, BUILTIN_DOMAIN_RID, NT_AUTHORITY};

const SE_FILE_OBJECT: i32 = 1;
const SET_ACCESS: i32 = 2;
const DENY_ACCESS: i32 = 3;
const NO_INHERITANCE: u32 = 0;
const ACCESS_ALLOWED_ACE_TYPE: u8 = 0;
const ACCESS_DENIED_ACE_TYPE: u8 = 1;
const INHERITED_ACE: u8 = 0x10;

/// Frees a buffer allocated by the OS with `LocalAlloc`.
struct LocalBox(*mut c_void);

impl Drop for LocalBox {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                LocalFree(self.0 as HLOCAL);
            }
        }
    }
}

/// A SID from `AllocateAndInitializeSid`, released with `FreeSid`.
struct AllocatedSid(*mut c_void);

impl Drop for AllocatedSid {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                FreeSid(self.0);
            }
        }
    }
}

struct TokenHandle(HANDLE);

impl Drop for TokenHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn to_wide<S: AsRef<std::ffi::OsStr>>(s: S) -> Vec<u16> {
    s.as_ref().encode_wide().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// SID bytes copied into a DWORD aligned buffer the API can read from.
fn sid_buffer(sid: &Sid) -> Vec<u32> {
    let mut buf = vec![0u32; sid.len().div_ceil(4)];
    unsafe {
        std::ptr::copy_nonoverlapping(sid.as_bytes().as_ptr(), buf.as_mut_ptr() as *mut u8, sid.len());
    }
    buf
}

/// Copy a SID owned by the OS into a [`Sid`].
///
/// # Safety
/// `psid` must be null or point to a SID that stays valid for the call.
unsafe fn sid_from_psid(psid: *mut c_void) -> Result<Sid> {
    if psid.is_null() || IsValidSid(psid) == 0 {
        return Err(SecurityError::InvalidSid("OS returned an invalid SID".to_string()));
    }
    let len = GetLengthSid(psid) as usize;
    Sid::from_bytes(std::slice::from_raw_parts(psid as *const u8, len))
}

/// Allow/deny for the plain ACE types; object and callback ACEs give `None`.
fn ace_access_type(ace_type: u8) -> Option<AclAccessType> {
    match ace_type {
        ACCESS_ALLOWED_ACE_TYPE => Some(AclAccessType::Allow),
        ACCESS_DENIED_ACE_TYPE => Some(AclAccessType::Deny),
        _ => None,
    }
}

pub struct WindowsBackend {
    system_name: Option<Vec<u16>>,
}

impl WindowsBackend {
    /// `system_name` selects the machine that resolves account names; `None` is the local machine.
    pub fn new(system_name: Option<&str>) -> Self {
        Self {
            system_name: system_name.map(to_wide),
        }
    }

    fn system_ptr(&self) -> *const u16 {
        self.system_name
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(std::ptr::null())
    }
}

impl SecurityBackend for WindowsBackend {
    fn owner_sid(&self, path: &Path) -> Result<Sid> {
        let wpath = to_wide(path);
        let mut owner: *mut c_void = null_mut();
        let mut sd: *mut c_void = null_mut();

        let code = unsafe {
            GetNamedSecurityInfoW(
                wpath.as_ptr(),
                SE_FILE_OBJECT,
                OWNER_SECURITY_INFORMATION,
                &mut owner,
                null_mut(),
                null_mut(),
                null_mut(),
                &mut sd,
            )
        };
        let _sd = LocalBox(sd);
        if code != ERROR_SUCCESS {
            return Err(SecurityError::OwnerRead {
                path: path.to_path_buf(),
                call: "GetNamedSecurityInfoW",
                code,
            });
        }

        // owner 指向 sd 内部，必须在 _sd 释放前复制
        unsafe { sid_from_psid(owner) }
    }

    fn lookup_account_name(&self, name: &str) -> Result<Sid> {
        let wname = to_wide(name);
        let not_found = |code| SecurityError::PrincipalNotFound {
            name: name.to_string(),
            call: "LookupAccountNameW",
            code,
        };

        let mut sid_len = 0u32;
        let mut domain_len = 0u32;
        let mut sid_use = 0;
        unsafe {
            LookupAccountNameW(
                self.system_ptr(),
                wname.as_ptr(),
                null_mut(),
                &mut sid_len,
                null_mut(),
                &mut domain_len,
                &mut sid_use,
            );
        }
        let code = unsafe { GetLastError() };
        if code != ERROR_INSUFFICIENT_BUFFER {
            return Err(not_found(code));
        }

        let mut sid_buf = vec![0u32; (sid_len as usize).div_ceil(4)];
        let mut domain = vec![0u16; domain_len as usize];
        let ok = unsafe {
            LookupAccountNameW(
                self.system_ptr(),
                wname.as_ptr(),
                sid_buf.as_mut_ptr() as *mut c_void,
                &mut sid_len,
                domain.as_mut_ptr(),
                &mut domain_len,
                &mut sid_use,
            )
        };
        if ok == 0 {
            return Err(not_found(unsafe { GetLastError() }));
        }

        let bytes = unsafe { std::slice::from_raw_parts(sid_buf.as_ptr() as *const u8, sid_len as usize) };
        Sid::from_bytes(bytes)
    }

    fn lookup_account_sid(&self, sid: &Sid) -> Result<String> {
        let mut sid_buf = sid_buffer(sid);
        let psid = sid_buf.as_mut_ptr() as *mut c_void;
        let not_mapped = |code| SecurityError::SidNotMapped {
            sid: sid.to_string(),
            call: "LookupAccountSidW",
            code,
        };

        let mut name_len = 0u32;
        let mut domain_len = 0u32;
        let mut sid_use = 0;
        unsafe {
            LookupAccountSidW(
                self.system_ptr(),
                psid,
                null_mut(),
                &mut name_len,
                null_mut(),
                &mut domain_len,
                &mut sid_use,
            );
        }
        let code = unsafe { GetLastError() };
        if code != ERROR_INSUFFICIENT_BUFFER {
            return Err(not_mapped(if code == ERROR_SUCCESS { ERROR_NONE_MAPPED } else { code }));
        }

        let mut name = vec![0u16; name_len as usize];
        let mut domain = vec![0u16; domain_len as usize];
        let ok = unsafe {
            LookupAccountSidW(
                self.system_ptr(),
                psid,
                name.as_mut_ptr(),
                &mut name_len,
                domain.as_mut_ptr(),
                &mut domain_len,
                &mut sid_use,
            )
        };
        if ok == 0 {
            return Err(not_mapped(unsafe { GetLastError() }));
        }

        Ok(from_wide(&name))
    }

    fn administrators_sid(&self) -> Result<Sid> {
        let authority = SID_IDENTIFIER_AUTHORITY {
            Value: [0, 0, 0, 0, 0, NT_AUTHORITY as u8],
        };
        let mut psid: *mut c_void = null_mut();

        let ok = unsafe {
            AllocateAndInitializeSid(
                &authority,
                2,
                BUILTIN_DOMAIN_RID,
                ALIAS_RID_ADMINS,
                0,
                0,
                0,
                0,
                0,
                0,
                &mut psid,
            )
        };
        let allocated = AllocatedSid(psid);
        if ok == 0 {
            return Err(SecurityError::AclBuild {
                call: "AllocateAndInitializeSid",
                code: unsafe { GetLastError() },
            });
        }

        unsafe { sid_from_psid(allocated.0) }
    }

    fn set_privilege(&self, name: &str, enable: bool) -> Result<bool> {
        let failed = |call, code| SecurityError::Privilege {
            privilege: name.to_string(),
            call,
            code,
        };

        let wname = to_wide(name);
        let mut luid = LUID {
            LowPart: 0,
            HighPart: 0,
        };
        if unsafe { LookupPrivilegeValueW(std::ptr::null(), wname.as_ptr(), &mut luid) } == 0 {
            return Err(failed("LookupPrivilegeValueW", unsafe { GetLastError() }));
        }

        let mut raw_token: HANDLE = 0;
        let ok = unsafe {
            OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut raw_token,
            )
        };
        if ok == 0 {
            return Err(failed("OpenProcessToken", unsafe { GetLastError() }));
        }
        let token = TokenHandle(raw_token);

        let new_state = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: if enable { SE_PRIVILEGE_ENABLED } else { 0 },
            }],
        };
        let mut previous: TOKEN_PRIVILEGES = unsafe { std::mem::zeroed() };
        let mut return_len = 0u32;

        let ok = unsafe {
            AdjustTokenPrivileges(
                token.0,
                0,
                &new_state,
                std::mem::size_of::<TOKEN_PRIVILEGES>() as u32,
                &mut previous,
                &mut return_len,
            )
        };
        // AdjustTokenPrivileges 成功时也可能设置 ERROR_NOT_ALL_ASSIGNED
        let code = unsafe { GetLastError() };
        if ok == 0 {
            return Err(failed("AdjustTokenPrivileges", code));
        }
        if code == ERROR_NOT_ALL_ASSIGNED {
            return Err(failed("AdjustTokenPrivileges", code));
        }

        // An empty previous state means nothing changed.
        if previous.PrivilegeCount == 0 {
            return Ok(enable);
        }
        Ok(previous.Privileges[0].Attributes & SE_PRIVILEGE_ENABLED != 0)
    }

    fn replace_owner(&self, path: &Path, owner: &Sid) -> Result<()> {
        let wpath = to_wide(path);
        let mut sid_buf = sid_buffer(owner);

        let code = unsafe {
            SetNamedSecurityInfoW(
                wpath.as_ptr() as *mut u16,
                SE_FILE_OBJECT,
                OWNER_SECURITY_INFORMATION,
                sid_buf.as_mut_ptr() as *mut c_void,
                null_mut(),
                null_mut::<ACL>(),
                null_mut::<ACL>(),
            )
        };
        if code != ERROR_SUCCESS {
            return Err(SecurityError::apply_failed(path, "SetNamedSecurityInfoW", code));
        }

        Ok(())
    }

    fn replace_dacl(&self, path: &Path, entries: &[AccessEntry]) -> Result<()> {
        // SID buffers must outlive SetEntriesInAclW
        let mut sid_bufs: Vec<Vec<u32>> = entries.iter().map(|e| sid_buffer(&e.sid)).collect();

        let explicit: Vec<EXPLICIT_ACCESS_W> = entries
            .iter()
            .zip(sid_bufs.iter_mut())
            .map(|(entry, sid_buf)| EXPLICIT_ACCESS_W {
                grfAccessPermissions: entry.mask.bits(),
                grfAccessMode: match entry.access_type {
                    AclAccessType::Allow => SET_ACCESS,
                    AclAccessType::Deny => DENY_ACCESS,
                },
                grfInheritance: NO_INHERITANCE,
                Trustee: TRUSTEE_W {
                    pMultipleTrustee: null_mut(),
                    MultipleTrusteeOperation: 0,
                    TrusteeForm: TRUSTEE_IS_SID,
                    TrusteeType: match entry.trustee {
                        TrusteeKind::User => TRUSTEE_IS_USER,
                        TrusteeKind::Group => TRUSTEE_IS_GROUP,
                        TrusteeKind::Unknown => TRUSTEE_IS_UNKNOWN,
                    },
                    ptstrName: sid_buf.as_mut_ptr() as *mut u16,
                },
            })
            .collect();

        let mut new_acl: *mut ACL = null_mut();
        let code = unsafe {
            SetEntriesInAclW(
                explicit.len() as u32,
                explicit.as_ptr(),
                null_mut::<ACL>(),
                &mut new_acl,
            )
        };
        let acl = LocalBox(new_acl as *mut c_void);
        if code != ERROR_SUCCESS {
            return Err(SecurityError::AclBuild {
                call: "SetEntriesInAclW",
                code,
            });
        }

        let wpath = to_wide(path);
        let code = unsafe {
            SetNamedSecurityInfoW(
                wpath.as_ptr() as *mut u16,
                SE_FILE_OBJECT,
                DACL_SECURITY_INFORMATION | PROTECTED_DACL_SECURITY_INFORMATION,
                null_mut(),
                null_mut(),
                acl.0 as *mut ACL,
                null_mut::<ACL>(),
            )
        };
        if code != ERROR_SUCCESS {
            return Err(SecurityError::apply_failed(path, "SetNamedSecurityInfoW", code));
        }

        Ok(())
    }

    fn read_dacl(&self, path: &Path) -> Result<Vec<AccessEntry>> {
        let wpath = to_wide(path);
        let mut dacl: *mut ACL = null_mut();
        let mut sd: *mut c_void = null_mut();

        let code = unsafe {
            GetNamedSecurityInfoW(
                wpath.as_ptr(),
                SE_FILE_OBJECT,
                DACL_SECURITY_INFORMATION,
                null_mut(),
                null_mut(),
                &mut dacl,
                null_mut(),
                &mut sd,
            )
        };
        let _sd = LocalBox(sd);
        if code != ERROR_SUCCESS {
            return Err(SecurityError::DaclRead {
                path: path.to_path_buf(),
                call: "GetNamedSecurityInfoW",
                code,
            });
        }

        // A NULL DACL grants everyone full access.
        if dacl.is_null() {
            let everyone = Sid::new(1, &[0])?;
            return Ok(vec![AccessEntry {
                sid: everyone,
                trustee: TrusteeKind::Group,
                mask: AccessMask::GENERIC_ALL,
                access_type: AclAccessType::Allow,
                inherited: false,
            }]);
        }

        let mut info: ACL_SIZE_INFORMATION = unsafe { std::mem::zeroed() };
        let ok = unsafe {
            GetAclInformation(
                dacl as *const ACL,
                &mut info as *mut _ as *mut c_void,
                std::mem::size_of::<ACL_SIZE_INFORMATION>() as u32,
                AclSizeInformation,
            )
        };
        if ok == 0 {
            return Err(SecurityError::DaclRead {
                path: path.to_path_buf(),
                call: "GetAclInformation",
                code: unsafe { GetLastError() },
            });
        }

        let mut entries = Vec::with_capacity(info.AceCount as usize);
        for i in 0..info.AceCount {
            let mut p_ace: *mut c_void = null_mut();
            if unsafe { GetAce(dacl as *const ACL, i, &mut p_ace) } == 0 {
                log::debug!(
                    "{}: skipping ACE {}: GetAce() failed: {}",
                    path.display(),
                    i,
                    unsafe { GetLastError() }
                );
                continue;
            }

            let header = unsafe { &*(p_ace as *const ACE_HEADER) };
            let Some(access_type) = ace_access_type(header.AceType) else {
                log::debug!("{}: skipping ACE {} of type {}", path.display(), i, header.AceType);
                continue;
            };

            // allowed and denied ACEs share one layout: header, mask, SID
            let ace = unsafe { &*(p_ace as *const ACCESS_ALLOWED_ACE) };
            let sid_ptr = (p_ace as usize + std::mem::size_of::<ACE_HEADER>() + std::mem::size_of::<u32>())
                as *mut c_void;
            let sid = unsafe { sid_from_psid(sid_ptr)? };

            entries.push(AccessEntry {
                sid,
                trustee: TrusteeKind::Unknown,
                mask: AccessMask::from_bits_retain(ace.Mask),
                access_type,
                inherited: header.AceFlags & INHERITED_ACE != 0,
            });
        }

        Ok(entries)
    }

    fn backend_type(&self) -> &'static str {
        "windows"
    }
}
