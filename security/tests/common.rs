use std::path::PathBuf;
use std::sync::Arc;

use security::{AccessEntry, AccessMask, MemoryBackend, OwnerAclManager, SecurityBackend, Sid};

pub const REPORT: &str = "C:\\Shares\\Finance\\report.xlsx";

pub fn alice() -> Sid {
    "S-1-5-21-3623811015-3361044348-30300820-1001".parse().unwrap()
}

pub fn bob() -> Sid {
    "S-1-5-21-3623811015-3361044348-30300820-1002".parse().unwrap()
}

pub fn report_path() -> PathBuf {
    PathBuf::from(REPORT)
}

/// 创建测试用的安全存储：Alice 拥有 report，DACL 带一条继承的 Users 读权限
pub fn create_test_backend() -> Arc<MemoryBackend> {
    let backend = MemoryBackend::new();
    backend.add_account("Alice", alice());
    backend.add_account("Bob", bob());

    let inherited = AccessEntry {
        inherited: true,
        ..AccessEntry::allow_group(Sid::builtin_users(), AccessMask::FILE_GENERIC_READ)
    };
    backend.add_object(REPORT, alice(), vec![inherited]);

    Arc::new(backend)
}

pub fn manager_for(backend: &Arc<MemoryBackend>) -> OwnerAclManager {
    OwnerAclManager::new(backend.clone() as Arc<dyn SecurityBackend>)
}
