use rbac_manager_lib::engine::config::{RbacConfig, TableConfig};
use rbac_manager_lib::engine::database::Database;
use rbac_manager_lib::engine::rbac::{
    AuthItem, Manager, Parameters, Permission, Role, SqliteStorage, Storage,
};
use std::path::Path;

fn open(db_path: &Path, tables: TableConfig) -> Manager<SqliteStorage> {
    let db = Database::new(db_path, tables).unwrap();
    Manager::new(SqliteStorage::new(db))
}

fn seed(manager: &Manager<SqliteStorage>) {
    manager.add_role(Role::new("admin")).unwrap();
    manager.add_role(Role::new("editor")).unwrap();
    manager
        .add_permission(Permission::new("publish").with_path("/posts"))
        .unwrap();

    manager.add_child(&Role::new("admin"), &Role::new("editor")).unwrap();
    manager.add_child(&Role::new("editor"), &Permission::new("publish")).unwrap();
    manager.assign(&Role::new("admin"), "42").unwrap();
}

fn check(manager: &Manager<SqliteStorage>, user: &str, permission: &str) -> bool {
    manager
        .user_has_permission(user, permission, &Parameters::new())
        .unwrap()
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("rbac.db");

    seed(&open(&db_path, TableConfig::default()));

    let manager = open(&db_path, TableConfig::default());
    assert!(check(&manager, "42", "publish"));

    let publish = manager.storage().get_permission_by_name("publish").unwrap().unwrap();
    assert_eq!(publish.path(), Some("/posts"));
    assert!(publish.has_created_time());

    let assignment = manager
        .storage()
        .get_user_assignment_by_name("42", "admin")
        .unwrap()
        .unwrap();
    assert!(assignment.created_at.is_some());
}

#[test]
fn test_remove_item_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open(&dir.path().join("rbac.db"), TableConfig::default());
    seed(&manager);

    manager.remove_role(&Role::new("editor")).unwrap();
    assert!(!check(&manager, "42", "publish"));
    assert!(manager.storage().get_children().unwrap().is_empty());

    manager.remove_role(&Role::new("admin")).unwrap();
    assert!(manager.storage().get_assignments().unwrap().is_empty());
}

#[test]
fn test_rename_keeps_edges_and_assignments() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open(&dir.path().join("rbac.db"), TableConfig::default());
    seed(&manager);

    let admin = manager.storage().get_role_by_name("admin").unwrap().unwrap();
    manager.update_role("admin", admin.with_name("root")).unwrap();

    let assignments = manager.storage().get_user_assignments("42").unwrap();
    assert_eq!(assignments.keys().collect::<Vec<_>>(), vec!["root"]);
    assert!(manager.has_child(&Role::new("root"), &Role::new("editor")).unwrap());
    assert!(check(&manager, "42", "publish"));
}

#[test]
fn test_custom_table_names() {
    let dir = tempfile::tempdir().unwrap();
    let tables = TableConfig {
        item: "acl_item".to_string(),
        item_child: "acl_item_child".to_string(),
        assignment: "acl_assignment".to_string(),
    };
    let manager = open(&dir.path().join("rbac.db"), tables);
    seed(&manager);

    let names = manager.storage().database().get_tables().unwrap();
    for table in ["acl_item", "acl_item_child", "acl_assignment"] {
        assert!(names.iter().any(|n| n == table), "missing table {}", table);
    }
    assert!(!names.iter().any(|n| n == "auth_item"));
    assert!(check(&manager, "42", "publish"));
}

#[test]
fn test_clear_permissions_keeps_roles() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open(&dir.path().join("rbac.db"), TableConfig::default());
    seed(&manager);

    manager.storage().clear_permissions().unwrap();
    assert!(manager.storage().get_permissions().unwrap().is_empty());
    assert_eq!(manager.storage().get_roles().unwrap().len(), 2);
    assert!(manager.get_permissions_by_role("admin").unwrap().is_empty());

    manager.storage().clear_roles().unwrap();
    assert!(manager.storage().get_items().unwrap().is_empty());
}

#[test]
fn test_project_config_opens_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = RbacConfig::default_for_project();
    config.save(dir.path()).unwrap();

    let loaded = RbacConfig::load(dir.path()).unwrap();
    let manager = open(&loaded.database_path(dir.path()), loaded.tables.clone());
    seed(&manager);

    assert!(dir.path().join("data").join("rbac.db").exists());
    assert_eq!(manager.get_user_ids_by_role("editor").unwrap(), vec!["42"]);
}
