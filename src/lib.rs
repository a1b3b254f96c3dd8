//! RBAC Manager - role-based access control engine
//!
//! Resolves whether a user holds a permission, directly or through a
//! hierarchy of roles, on top of in-memory or SQLite storage.

pub mod engine;

pub use engine::rbac::{
    Assignment, AuthItem, DefaultRoles, Item, ItemType, Manager, MemoryStorage, Permission,
    RbacError, Role, SqliteStorage, Storage,
};
