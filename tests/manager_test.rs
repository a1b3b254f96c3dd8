use rbac_manager_lib::engine::rbac::{
    AuthItem, DefaultRoles, ErrorKind, Manager, MemoryStorage, Parameters, Permission, RbacError,
    Role, Storage,
};
use serde_json::json;

/// admin -> editor -> author, with `publish` under editor.
/// User 1 holds author, user 2 holds admin.
fn blog_manager() -> Manager<MemoryStorage> {
    let manager = Manager::new(MemoryStorage::new());

    for name in ["admin", "editor", "author"] {
        manager.add_role(Role::new(name)).unwrap();
    }
    manager.add_permission(Permission::new("publish")).unwrap();
    manager.add_permission(Permission::new("read")).unwrap();

    manager.add_child(&Role::new("admin"), &Role::new("editor")).unwrap();
    manager.add_child(&Role::new("editor"), &Role::new("author")).unwrap();
    manager.add_child(&Role::new("editor"), &Permission::new("publish")).unwrap();
    manager.add_child(&Role::new("author"), &Permission::new("read")).unwrap();

    manager.assign(&Role::new("author"), "1").unwrap();
    manager.assign(&Role::new("admin"), "2").unwrap();
    manager
}

fn check(manager: &Manager<MemoryStorage>, user: &str, permission: &str) -> bool {
    manager
        .user_has_permission(user, permission, &Parameters::new())
        .unwrap()
}

#[test]
fn test_permission_flows_down_the_hierarchy() {
    let manager = blog_manager();

    assert!(check(&manager, "2", "publish"));
    assert!(check(&manager, "2", "read"));
    assert!(check(&manager, "1", "read"));
    assert!(!check(&manager, "1", "publish"));
}

#[test]
fn test_unknown_user_or_permission_is_denied() {
    let manager = blog_manager();

    assert!(!check(&manager, "99", "publish"));
    assert!(!check(&manager, "2", "delete"));
    // roles are not permissions
    assert!(!check(&manager, "2", "editor"));
}

#[test]
fn test_loop_is_rejected() {
    let manager = blog_manager();
    let admin = Role::new("admin");
    let author = Role::new("author");

    assert!(!manager.can_add_child(&author, &admin).unwrap());
    assert!(manager.can_add_child(&admin, &Permission::new("read")).unwrap());

    let err = manager.add_child(&author, &admin).unwrap_err();
    assert!(matches!(err, RbacError::LoopDetected { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(!manager.has_child(&author, &admin).unwrap());
}

#[test]
fn test_invalid_edges() {
    let manager = blog_manager();

    let err = manager.add_child(&Role::new("admin"), &Role::new("admin")).unwrap_err();
    assert!(matches!(err, RbacError::SelfReference(name) if name == "admin"));

    let err = manager
        .add_child(&Permission::new("publish"), &Role::new("author"))
        .unwrap_err();
    assert!(matches!(err, RbacError::InvalidHierarchy { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = manager
        .add_child(&Role::new("editor"), &Role::new("author"))
        .unwrap_err();
    assert!(matches!(err, RbacError::DuplicateChild { .. }));

    let err = manager.add_child(&Role::new("admin"), &Role::new("ghost")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_permission_may_parent_permission() {
    let manager = blog_manager();
    manager.add_permission(Permission::new("publish.draft")).unwrap();

    manager
        .add_child(&Permission::new("publish"), &Permission::new("publish.draft"))
        .unwrap();

    assert!(check(&manager, "2", "publish.draft"));
    assert!(!check(&manager, "1", "publish.draft"));
}

#[test]
fn test_remove_child_and_children() {
    let manager = blog_manager();
    let editor = Role::new("editor");

    manager.remove_child(&editor, &Permission::new("publish")).unwrap();
    assert!(!manager.has_child(&editor, &Permission::new("publish")).unwrap());
    assert!(!check(&manager, "2", "publish"));
    // the item itself survives
    assert!(manager.storage().get_permission_by_name("publish").unwrap().is_some());

    // detaching an absent edge is a no-op
    manager.remove_child(&editor, &Permission::new("publish")).unwrap();

    manager.remove_children(&editor).unwrap();
    assert!(!manager.storage().has_children("editor").unwrap());
    assert!(!check(&manager, "2", "read"));
}

#[test]
fn test_permissions_by_role_excludes_roles() {
    let manager = blog_manager();

    let permissions = manager.get_permissions_by_role("admin").unwrap();
    let names: Vec<_> = permissions.keys().cloned().collect();
    assert_eq!(names, vec!["publish", "read"]);

    assert!(manager.get_permissions_by_role("ghost").unwrap().is_empty());
}

#[test]
fn test_child_roles_include_the_role_itself() {
    let manager = blog_manager();

    let roles = manager.get_child_roles("admin").unwrap();
    let names: Vec<_> = roles.keys().cloned().collect();
    assert_eq!(names, vec!["admin", "author", "editor"]);

    let err = manager.get_child_roles("publish").unwrap_err();
    assert!(matches!(err, RbacError::RoleNotFound(_)));
}

#[test]
fn test_user_ids_by_role() {
    let manager = blog_manager();

    assert_eq!(manager.get_user_ids_by_role("author").unwrap(), vec!["1", "2"]);
    assert_eq!(manager.get_user_ids_by_role("admin").unwrap(), vec!["2"]);
    assert!(manager.get_user_ids_by_role("ghost").unwrap().is_empty());

    // two matching assignments still list the user once
    manager.assign(&Role::new("editor"), "3").unwrap();
    manager.assign(&Role::new("author"), "3").unwrap();
    assert_eq!(manager.get_user_ids_by_role("author").unwrap(), vec!["1", "2", "3"]);
}

#[test]
fn test_assign_rejects_held_items() {
    let manager = blog_manager();

    let err = manager.assign(&Role::new("admin"), "2").unwrap_err();
    assert!(matches!(err, RbacError::AlreadyAssigned { .. }));

    // publish already reaches user 2 through admin
    let err = manager.assign(&Permission::new("publish"), "2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let assignment = manager.assign(&Permission::new("publish"), "1").unwrap();
    assert_eq!(assignment.user_id, "1");
    assert_eq!(assignment.item_name, "publish");
    assert!(assignment.created_at.is_some());
    assert!(check(&manager, "1", "publish"));
}

#[test]
fn test_grouped_permissions() {
    let manager = blog_manager();
    manager.assign(&Permission::new("publish"), "3").unwrap();
    manager.assign(&Role::new("author"), "3").unwrap();

    let grouped = manager.get_grouped_permissions_by_user("3").unwrap();
    assert_eq!(grouped.direct.keys().collect::<Vec<_>>(), vec!["publish"]);
    assert_eq!(grouped.inherited.keys().collect::<Vec<_>>(), vec!["read"]);

    let all = manager.get_permissions_by_user("3").unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_revoke() {
    let manager = blog_manager();

    let err = manager.revoke(&Role::new("admin"), "1").unwrap_err();
    assert!(matches!(err, RbacError::AssignmentNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::State);

    manager.revoke(&Role::new("author"), "1").unwrap();
    assert!(!check(&manager, "1", "read"));
    assert!(manager.storage().get_user_assignments("1").unwrap().is_empty());
}

#[test]
fn test_revoke_all_leaves_default_roles() {
    let storage = MemoryStorage::new();
    let manager = Manager::with_default_roles(storage, vec!["guest"]).unwrap();
    manager.add_role(Role::new("guest")).unwrap();
    manager.add_role(Role::new("admin")).unwrap();
    manager.assign(&Role::new("admin"), "7").unwrap();

    let roles = manager.get_roles_by_user("7").unwrap();
    assert_eq!(roles.keys().collect::<Vec<_>>(), vec!["admin", "guest"]);

    manager.revoke_all("7").unwrap();
    let roles = manager.get_roles_by_user("7").unwrap();
    assert_eq!(roles.keys().collect::<Vec<_>>(), vec!["guest"]);
}

#[test]
fn test_rename_collision_leaves_storage_unchanged() {
    let manager = blog_manager();
    let before = manager.storage().get_items().unwrap();

    let err = manager.update_role("editor", Role::new("admin")).unwrap_err();
    assert!(matches!(err, RbacError::NameCollision(name) if name == "admin"));
    assert_eq!(manager.storage().get_items().unwrap(), before);

    let err = manager.update_role("ghost", Role::new("spirit")).unwrap_err();
    assert!(matches!(err, RbacError::ItemNotFound { .. }));
}

#[test]
fn test_rename_keeps_edges_and_assignments() {
    let manager = blog_manager();
    let editor = manager.storage().get_role_by_name("editor").unwrap().unwrap();

    manager
        .update_role("editor", editor.with_name("chief").with_description("Runs the desk"))
        .unwrap();

    assert!(manager.storage().get_role_by_name("editor").unwrap().is_none());
    assert!(manager.has_child(&Role::new("admin"), &Role::new("chief")).unwrap());
    assert!(check(&manager, "2", "publish"));

    let chief = manager.storage().get_role_by_name("chief").unwrap().unwrap();
    assert_eq!(chief.description(), "Runs the desk");
    assert!(chief.updated_time() >= chief.created_time());
}

#[test]
fn test_remove_item_strips_edges_and_assignments() {
    let manager = blog_manager();

    manager.remove_role(&Role::new("editor")).unwrap();
    assert!(!check(&manager, "2", "publish"));
    assert!(manager.storage().get_children_by_name("admin").unwrap().is_empty());

    manager.remove_role(&Role::new("author")).unwrap();
    assert!(manager.storage().get_user_assignments("1").unwrap().is_empty());

    // unknown items are ignored
    manager.remove_permission(&Permission::new("ghost")).unwrap();
}

#[test]
fn test_default_roles_sources() {
    let mut manager = Manager::new(MemoryStorage::new());

    manager
        .set_default_roles(DefaultRoles::producer(|| json!(["guest", "member"])))
        .unwrap();
    assert_eq!(manager.get_default_roles(), ["guest", "member"]);

    let instances = manager.get_default_role_instances();
    assert_eq!(instances["member"].name(), "member");

    let err = manager
        .set_default_roles(DefaultRoles::producer(|| json!("guest")))
        .err()
        .unwrap();
    assert!(matches!(err, RbacError::InvalidProducerResult(_)));

    let err = manager.set_default_roles(json!({"guest": true})).err().unwrap();
    assert!(matches!(err, RbacError::InvalidDefaultRoles));

    // a failed update keeps the previous roles
    assert_eq!(manager.get_default_roles(), ["guest", "member"]);
}

#[test]
fn test_default_roles_rejected_at_construction() {
    let result = Manager::with_default_roles(MemoryStorage::new(), json!("guest"));
    assert!(matches!(result, Err(RbacError::InvalidDefaultRoles)));
}

#[test]
fn test_concurrent_assign_grants_once() {
    let manager = blog_manager();

    let successes = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| manager.assign(&Role::new("editor"), "5").is_ok()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count()
    });

    assert_eq!(successes, 1);
    assert_eq!(manager.storage().get_user_assignments("5").unwrap().len(), 1);
}

#[test]
fn test_concurrent_edges_never_close_a_cycle() {
    let manager = Manager::new(MemoryStorage::new());
    manager.add_role(Role::new("a")).unwrap();
    manager.add_role(Role::new("b")).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| manager.add_child(&Role::new("a"), &Role::new("b")));
        scope.spawn(|| manager.add_child(&Role::new("b"), &Role::new("a")));
    });

    let a_to_b = manager.has_child(&Role::new("a"), &Role::new("b")).unwrap();
    let b_to_a = manager.has_child(&Role::new("b"), &Role::new("a")).unwrap();
    assert!(a_to_b ^ b_to_a);
}

#[test]
fn test_update_cannot_change_item_type() {
    let manager = Manager::new(MemoryStorage::new());
    manager.add_permission(Permission::new("q")).unwrap();
    manager.add_permission(Permission::new("p")).unwrap();
    manager.add_child(&Permission::new("q"), &Permission::new("p")).unwrap();

    let err = manager.update_role("p", Role::new("p")).unwrap_err();
    assert!(matches!(err, RbacError::TypeChange { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(manager.storage().get_role_by_name("p").unwrap().is_none());
    assert!(manager.storage().get_permission_by_name("p").unwrap().is_some());
    let children = manager.storage().get_children_by_name("q").unwrap();
    assert!(children["p"].is_permission());
}

#[test]
fn test_remove_requires_matching_type() {
    let manager = blog_manager();

    manager.remove_role(&Role::new("publish")).unwrap();
    assert!(manager.storage().get_permission_by_name("publish").unwrap().is_some());
    assert!(check(&manager, "2", "publish"));

    manager.remove_permission(&Permission::new("editor")).unwrap();
    assert!(manager.storage().get_role_by_name("editor").unwrap().is_some());
}

#[test]
fn test_default_roles_do_not_grant_permissions() {
    let manager = Manager::with_default_roles(MemoryStorage::new(), vec!["guest"]).unwrap();
    manager.add_role(Role::new("guest")).unwrap();
    manager.add_permission(Permission::new("read")).unwrap();
    manager.add_child(&Role::new("guest"), &Permission::new("read")).unwrap();

    let granted = manager.user_has_permission("anonymous", "read", &Parameters::new());
    assert!(matches!(granted, Ok(false)));
    assert!(manager.get_roles_by_user("anonymous").unwrap().contains_key("guest"));
}
