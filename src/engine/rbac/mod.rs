//! RBAC Module
//!
//! Role/permission hierarchy, user assignments and permission resolution
//! over a pluggable storage backend

pub mod default_roles;
pub mod error;
pub mod factory;
pub mod hierarchy;
pub mod item;
pub mod manager;
pub mod storage;

pub use default_roles::DefaultRoles;
pub use error::{ErrorKind, RbacError};
pub use factory::ItemFactory;
pub use hierarchy::Hierarchy;
pub use item::{Assignment, AuthItem, Item, ItemAttributes, ItemType, Permission, Role};
pub use manager::{GroupedPermissions, Manager, Parameters, PermissionMap, RoleMap};
pub use storage::{MemoryStorage, SqliteStorage, Storage, StorageError};
