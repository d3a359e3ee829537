mod common;

use std::path::Path;

use common::{alice, bob, create_test_backend, manager_for, report_path};
use security::error::ERROR_NOT_ENOUGH_MEMORY;
use security::memory::SE_TAKE_OWNERSHIP_NAME;
use security::{AccessEntry, AccessMask, AclAccessType, PermissionSet, SecurityError, Sid};

#[test]
fn owner_name_resolves_account() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    assert_eq!(manager.owner_name(&report_path()).unwrap(), "Alice");
}

#[test]
fn owner_name_fails_for_unmapped_owner() {
    let backend = create_test_backend();
    let orphan: Sid = "S-1-5-21-9-9-9-4242".parse().unwrap();
    backend.add_object("C:\\orphan.txt", orphan, Vec::new());
    let manager = manager_for(&backend);

    let err = manager.owner_name(Path::new("C:\\orphan.txt")).unwrap_err();
    assert!(matches!(err, SecurityError::SidNotMapped { .. }));
}

#[test]
fn owner_name_fails_for_missing_object() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    let err = manager.owner_name(Path::new("C:\\missing.txt")).unwrap_err();
    assert!(matches!(err, SecurityError::OwnerRead { .. }));
}

#[test]
fn set_owner_round_trip() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    manager.set_owner(&report_path(), "Bob").unwrap();
    assert_eq!(manager.owner_name(&report_path()).unwrap(), "Bob");
    assert_eq!(backend.owner_of(report_path()), Some(bob()));
}

#[test]
fn set_owner_unknown_principal_leaves_owner_unchanged() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    let err = manager.set_owner(&report_path(), "Mallory").unwrap_err();
    assert!(matches!(err, SecurityError::PrincipalNotFound { ref name, .. } if name == "Mallory"));
    assert_eq!(backend.owner_of(report_path()), Some(alice()));

    // 名字解析失败时不触碰特权
    assert!(backend.privilege_history(SE_TAKE_OWNERSHIP_NAME).is_empty());
}

#[test]
fn privilege_is_enabled_only_around_owner_change() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    assert!(!backend.privilege_enabled(SE_TAKE_OWNERSHIP_NAME));
    manager.set_owner(&report_path(), "Bob").unwrap();

    assert!(!backend.privilege_enabled(SE_TAKE_OWNERSHIP_NAME));
    assert_eq!(backend.privilege_history(SE_TAKE_OWNERSHIP_NAME), vec![true, false]);
}

#[test]
fn privilege_is_released_when_owner_change_fails() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    let err = manager
        .set_owner(Path::new("C:\\missing.txt"), "Bob")
        .unwrap_err();
    assert!(matches!(err, SecurityError::Apply { .. }));

    assert!(!backend.privilege_enabled(SE_TAKE_OWNERSHIP_NAME));
    assert_eq!(backend.privilege_history(SE_TAKE_OWNERSHIP_NAME), vec![true, false]);
}

#[test]
fn privilege_already_enabled_stays_enabled() {
    use security::SecurityBackend;

    let backend = create_test_backend();
    backend.set_privilege(SE_TAKE_OWNERSHIP_NAME, true).unwrap();
    let manager = manager_for(&backend);

    manager.set_owner(&report_path(), "Bob").unwrap();
    assert!(backend.privilege_enabled(SE_TAKE_OWNERSHIP_NAME));
}

#[test]
fn set_owner_without_privilege_is_access_denied() {
    let backend = create_test_backend();
    backend.set_privilege_held(SE_TAKE_OWNERSHIP_NAME, false);
    backend.set_privilege_held(security::memory::SE_RESTORE_NAME, false);
    let manager = manager_for(&backend);

    let err = manager.set_owner(&report_path(), "Bob").unwrap_err();
    assert!(err.is_access_denied());
    assert_eq!(backend.owner_of(report_path()), Some(alice()));

    // 设为当前 owner 不需要特权
    manager.set_owner(&report_path(), "alice").unwrap();
    assert!(!backend.privilege_enabled(SE_TAKE_OWNERSHIP_NAME));
}

#[test]
fn custom_privilege_name_is_used() {
    let backend = create_test_backend();
    let manager = manager_for(&backend).with_privilege(security::memory::SE_RESTORE_NAME);

    manager.set_owner(&report_path(), "Bob").unwrap();
    assert_eq!(
        backend.privilege_history(security::memory::SE_RESTORE_NAME),
        vec![true, false]
    );
    assert!(backend.privilege_history(SE_TAKE_OWNERSHIP_NAME).is_empty());
}

#[test]
fn read_write_example_yields_two_entries() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    manager
        .set_owner_group_permissions(&report_path(), PermissionSet::READ | PermissionSet::WRITE)
        .unwrap();

    let dacl = backend.dacl_of(report_path()).unwrap();
    assert_eq!(
        dacl,
        vec![
            AccessEntry::allow_group(alice(), AccessMask::GENERIC_READ | AccessMask::GENERIC_WRITE),
            AccessEntry::allow_group(Sid::builtin_administrators(), AccessMask::GENERIC_ALL),
        ]
    );
}

#[test]
fn read_only_request_keeps_administrators_full_control() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    manager
        .set_owner_group_permissions(&report_path(), PermissionSet::READ)
        .unwrap();

    let dacl = backend.dacl_of(report_path()).unwrap();
    assert_eq!(dacl.len(), 2);
    assert_eq!(dacl[0].mask, AccessMask::GENERIC_READ);
    assert_eq!(dacl[1].sid, Sid::builtin_administrators());
    assert!(dacl[1].mask.is_full_control());
}

#[test]
fn second_call_replaces_first() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    manager
        .set_owner_group_permissions(&report_path(), PermissionSet::all())
        .unwrap();
    manager
        .set_owner_group_permissions(&report_path(), PermissionSet::EXECUTE)
        .unwrap();

    let dacl = backend.dacl_of(report_path()).unwrap();
    assert_eq!(dacl.len(), 2);
    assert_eq!(dacl[0].mask, AccessMask::GENERIC_EXECUTE);
    assert!(dacl.iter().all(|e| !e.inherited));
}

#[test]
fn permissions_follow_current_owner() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    manager.set_owner(&report_path(), "Bob").unwrap();
    manager
        .set_owner_group_permissions(&report_path(), PermissionSet::READ)
        .unwrap();

    let dacl = backend.dacl_of(report_path()).unwrap();
    assert_eq!(dacl[0].sid, bob());
}

#[test]
fn administrators_owner_collapses_to_one_entry() {
    let backend = create_test_backend();
    backend.add_object("C:\\admin.cfg", Sid::builtin_administrators(), Vec::new());
    let manager = manager_for(&backend);

    manager
        .set_owner_group_permissions(Path::new("C:\\admin.cfg"), PermissionSet::READ)
        .unwrap();

    let dacl = backend.dacl_of("C:\\admin.cfg").unwrap();
    assert_eq!(
        dacl,
        vec![AccessEntry::allow_group(Sid::builtin_administrators(), AccessMask::GENERIC_ALL)]
    );
}

#[test]
fn access_denied_is_reported_distinctly_and_dacl_is_untouched() {
    let backend = create_test_backend();
    backend.lock_dacl(report_path());
    let manager = manager_for(&backend);
    let before = backend.dacl_of(report_path()).unwrap();

    let err = manager
        .set_owner_group_permissions(&report_path(), PermissionSet::READ)
        .unwrap_err();
    assert!(err.is_access_denied());
    assert_eq!(err.code(), Some(5));
    assert_eq!(backend.dacl_of(report_path()).unwrap(), before);
}

#[test]
fn administrators_sid_failure_leaves_dacl_untouched() {
    let backend = create_test_backend();
    backend.fail_administrators_sid(ERROR_NOT_ENOUGH_MEMORY);
    let manager = manager_for(&backend);
    let before = backend.dacl_of(report_path()).unwrap();

    let err = manager
        .set_owner_group_permissions(&report_path(), PermissionSet::READ | PermissionSet::WRITE)
        .unwrap_err();
    assert!(matches!(
        err,
        SecurityError::AclBuild {
            call: "AllocateAndInitializeSid",
            code: ERROR_NOT_ENOUGH_MEMORY
        }
    ));
    assert!(!err.is_access_denied());
    assert_eq!(backend.dacl_of(report_path()).unwrap(), before);
}

#[test]
fn acl_entries_failure_leaves_dacl_untouched() {
    let backend = create_test_backend();
    backend.fail_acl_entries(ERROR_NOT_ENOUGH_MEMORY);
    let manager = manager_for(&backend);
    let before = backend.dacl_of(report_path()).unwrap();

    let err = manager
        .set_owner_group_permissions(&report_path(), PermissionSet::READ)
        .unwrap_err();
    assert!(matches!(err, SecurityError::AclBuild { call: "SetEntriesInAclW", .. }));
    assert_eq!(backend.dacl_of(report_path()).unwrap(), before);
    assert_eq!(backend.owner_of(report_path()), Some(alice()));
}

#[test]
fn permissions_on_missing_object_fail_on_owner_read() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    let err = manager
        .set_owner_group_permissions(Path::new("C:\\missing.txt"), PermissionSet::READ)
        .unwrap_err();
    assert!(matches!(err, SecurityError::OwnerRead { .. }));
}

#[test]
fn describe_resolves_names_and_flags() {
    let backend = create_test_backend();
    let manager = manager_for(&backend);

    let info = manager.describe(&report_path()).unwrap();
    assert_eq!(info.owner, "Alice");
    assert_eq!(info.owner_sid, alice());
    assert_eq!(info.permissions.len(), 1);
    assert_eq!(info.permissions[0].account, "Users");
    assert_eq!(info.permissions[0].rights, vec!["read"]);
    assert!(info.permissions[0].is_inherited);

    manager
        .set_owner_group_permissions(&report_path(), PermissionSet::READ | PermissionSet::EXECUTE)
        .unwrap();
    let info = manager.describe(&report_path()).unwrap();
    assert_eq!(info.permissions.len(), 2);
    assert_eq!(info.permissions[0].account, "Alice");
    assert_eq!(info.permissions[0].rights, vec!["read", "execute"]);
    assert_eq!(info.permissions[1].account, "Administrators");
    assert_eq!(info.permissions[1].rights, vec!["full_control"]);
    assert!(info
        .permissions
        .iter()
        .all(|e| e.access_type == AclAccessType::Allow && !e.is_inherited));
}

#[test]
fn describe_falls_back_to_sid_string() {
    let backend = create_test_backend();
    let orphan: Sid = "S-1-5-21-9-9-9-4242".parse().unwrap();
    backend.add_object(
        "C:\\orphan.txt",
        orphan.clone(),
        vec![AccessEntry::allow_group(orphan, AccessMask::GENERIC_ALL)],
    );
    let manager = manager_for(&backend);

    let info = manager.describe(Path::new("C:\\orphan.txt")).unwrap();
    assert_eq!(info.owner, "S-1-5-21-9-9-9-4242");
    assert_eq!(info.permissions[0].account, "S-1-5-21-9-9-9-4242");
}
