//! RBAC Storage Layer
//!
//! Trait-based gateway over the items, parent/child edges and user
//! assignments the manager reasons about. Two backends ship with the crate:
//! an in-process store and a SQLite store.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::collections::BTreeMap;
use thiserror::Error;

use super::item::{Assignment, Item, Permission, Role};
use crate::engine::database::DatabaseError;

/// Items indexed by name
pub type ItemMap = BTreeMap<String, Item>;

/// Parent name -> (child name -> child item)
pub type ChildrenMap = BTreeMap<String, ItemMap>;

/// Item name -> assignment, for one user
pub type AssignmentMap = BTreeMap<String, Assignment>;

/// User id -> that user's assignments
pub type UserAssignmentMap = BTreeMap<String, AssignmentMap>;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Item not found in storage: {0}")]
    ItemNotFound(String),
    #[error("Malformed stored row: {0}")]
    InvalidRow(String),
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Storage gateway consumed by the manager.
///
/// Every call is atomic on its own; callers needing check-then-act
/// atomicity serialize around it.
pub trait Storage: Send + Sync {
    // ========== Items ==========

    /// All items indexed by name
    fn get_items(&self) -> StorageResult<ItemMap>;

    fn get_item_by_name(&self, name: &str) -> StorageResult<Option<Item>> {
        Ok(self.get_items()?.remove(name))
    }

    fn add_item(&self, item: &Item) -> StorageResult<()>;

    /// Replace the item stored under `name`, which may rename it
    fn update_item(&self, name: &str, item: &Item) -> StorageResult<()>;

    /// Remove an item along with every edge and assignment referencing it
    fn remove_item(&self, item: &Item) -> StorageResult<()>;

    fn get_roles(&self) -> StorageResult<BTreeMap<String, Role>> {
        Ok(self
            .get_items()?
            .into_iter()
            .filter_map(|(name, item)| item.into_role().map(|role| (name, role)))
            .collect())
    }

    fn get_role_by_name(&self, name: &str) -> StorageResult<Option<Role>> {
        Ok(self.get_item_by_name(name)?.and_then(Item::into_role))
    }

    fn get_permissions(&self) -> StorageResult<BTreeMap<String, Permission>> {
        Ok(self
            .get_items()?
            .into_iter()
            .filter_map(|(name, item)| item.into_permission().map(|p| (name, p)))
            .collect())
    }

    fn get_permission_by_name(&self, name: &str) -> StorageResult<Option<Permission>> {
        Ok(self.get_item_by_name(name)?.and_then(Item::into_permission))
    }

    /// Remove every role
    fn clear_roles(&self) -> StorageResult<()>;

    /// Remove every permission
    fn clear_permissions(&self) -> StorageResult<()>;

    // ========== Hierarchy ==========

    fn get_children(&self) -> StorageResult<ChildrenMap>;

    fn get_children_by_name(&self, name: &str) -> StorageResult<ItemMap> {
        Ok(self.get_children()?.remove(name).unwrap_or_default())
    }

    fn has_children(&self, name: &str) -> StorageResult<bool> {
        Ok(!self.get_children_by_name(name)?.is_empty())
    }

    fn add_child(&self, parent: &Item, child: &Item) -> StorageResult<()>;

    fn remove_child(&self, parent: &Item, child: &Item) -> StorageResult<()>;

    fn remove_children(&self, parent: &Item) -> StorageResult<()>;

    // ========== Assignments ==========

    fn get_assignments(&self) -> StorageResult<UserAssignmentMap>;

    fn get_user_assignments(&self, user_id: &str) -> StorageResult<AssignmentMap>;

    fn get_user_assignment_by_name(&self, user_id: &str, name: &str) -> StorageResult<Option<Assignment>> {
        Ok(self.get_user_assignments(user_id)?.remove(name))
    }

    fn add_assignment(&self, user_id: &str, item: &Item) -> StorageResult<()>;

    fn remove_assignment(&self, user_id: &str, assignment: &Assignment) -> StorageResult<()>;

    fn remove_all_assignments(&self, user_id: &str) -> StorageResult<()>;

    /// Drop any cached rows so the next read goes to the backend
    fn clear_loaded_items(&self) {}
}

