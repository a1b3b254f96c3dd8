//! In-process RBAC storage
//!
//! Keeps items, edges and assignments behind a single `RwLock`. Renames and
//! removals sweep edges and assignments explicitly since there is no
//! backend to cascade them.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    AssignmentMap, ChildrenMap, ItemMap, Storage, StorageError, StorageResult, UserAssignmentMap,
};
use crate::engine::rbac::item::{Assignment, AuthItem, Item, ItemType};

#[derive(Debug, Clone)]
struct StoredItem {
    id: i64,
    item: Item,
}

#[derive(Debug, Default)]
struct MemoryState {
    items: BTreeMap<String, StoredItem>,
    children: BTreeMap<String, BTreeSet<String>>,
    assignments: BTreeMap<String, AssignmentMap>,
    next_id: i64,
}

impl MemoryState {
    fn require(&self, name: &str) -> StorageResult<&StoredItem> {
        self.items
            .get(name)
            .ok_or_else(|| StorageError::ItemNotFound(name.to_string()))
    }

    fn detach(&mut self, name: &str) {
        self.items.remove(name);
        self.children.remove(name);
        for children in self.children.values_mut() {
            children.remove(name);
        }
        self.children.retain(|_, children| !children.is_empty());

        for assignments in self.assignments.values_mut() {
            assignments.remove(name);
        }
    }

    fn rename(&mut self, from: &str, to: &str) {
        if let Some(children) = self.children.remove(from) {
            self.children.insert(to.to_string(), children);
        }
        for children in self.children.values_mut() {
            if children.remove(from) {
                children.insert(to.to_string());
            }
        }

        for assignments in self.assignments.values_mut() {
            if let Some(assignment) = assignments.remove(from) {
                let renamed = Assignment {
                    item_name: to.to_string(),
                    ..assignment
                };
                assignments.insert(to.to_string(), renamed);
            }
        }
    }

    fn clear_type(&mut self, item_type: ItemType) {
        let names: Vec<String> = self
            .items
            .values()
            .filter(|stored| stored.item.item_type() == item_type)
            .map(|stored| stored.item.name().to_string())
            .collect();

        for name in names {
            self.detach(&name);
        }
    }
}

/// Storage held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StorageError::LockPoisoned)
    }
}

impl Storage for MemoryStorage {
    fn get_items(&self) -> StorageResult<ItemMap> {
        let state = self.read()?;
        Ok(state
            .items
            .iter()
            .map(|(name, stored)| (name.clone(), stored.item.clone()))
            .collect())
    }

    fn get_item_by_name(&self, name: &str) -> StorageResult<Option<Item>> {
        Ok(self.read()?.items.get(name).map(|stored| stored.item.clone()))
    }

    fn add_item(&self, item: &Item) -> StorageResult<()> {
        let mut state = self.write()?;
        state.next_id += 1;
        let id = state.next_id;
        state.items.insert(
            item.name().to_string(),
            StoredItem {
                id,
                item: item.clone(),
            },
        );
        Ok(())
    }

    fn update_item(&self, name: &str, item: &Item) -> StorageResult<()> {
        let mut state = self.write()?;
        let id = state.require(name)?.id;

        if item.name() != name {
            state.items.remove(name);
            state.rename(name, item.name());
        }

        let item = item.clone().with_updated_time(Some(Utc::now()));
        state.items.insert(item.name().to_string(), StoredItem { id, item });
        Ok(())
    }

    fn remove_item(&self, item: &Item) -> StorageResult<()> {
        self.write()?.detach(item.name());
        Ok(())
    }

    fn clear_roles(&self) -> StorageResult<()> {
        self.write()?.clear_type(ItemType::Role);
        Ok(())
    }

    fn clear_permissions(&self) -> StorageResult<()> {
        self.write()?.clear_type(ItemType::Permission);
        Ok(())
    }

    fn get_children(&self) -> StorageResult<ChildrenMap> {
        let state = self.read()?;
        let mut result = ChildrenMap::new();

        for (parent, children) in &state.children {
            let items: ItemMap = children
                .iter()
                .filter_map(|name| {
                    state
                        .items
                        .get(name)
                        .map(|stored| (name.clone(), stored.item.clone()))
                })
                .collect();
            if !items.is_empty() {
                result.insert(parent.clone(), items);
            }
        }

        Ok(result)
    }

    fn add_child(&self, parent: &Item, child: &Item) -> StorageResult<()> {
        let mut state = self.write()?;
        state.require(parent.name())?;
        state.require(child.name())?;

        state
            .children
            .entry(parent.name().to_string())
            .or_default()
            .insert(child.name().to_string());
        Ok(())
    }

    fn remove_child(&self, parent: &Item, child: &Item) -> StorageResult<()> {
        let mut state = self.write()?;
        if let Some(children) = state.children.get_mut(parent.name()) {
            children.remove(child.name());
            if children.is_empty() {
                state.children.remove(parent.name());
            }
        }
        Ok(())
    }

    fn remove_children(&self, parent: &Item) -> StorageResult<()> {
        self.write()?.children.remove(parent.name());
        Ok(())
    }

    fn get_assignments(&self) -> StorageResult<UserAssignmentMap> {
        Ok(self.read()?.assignments.clone())
    }

    fn get_user_assignments(&self, user_id: &str) -> StorageResult<AssignmentMap> {
        Ok(self
            .read()?
            .assignments
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    fn add_assignment(&self, user_id: &str, item: &Item) -> StorageResult<()> {
        let mut state = self.write()?;
        let id = state.require(item.name())?.id;

        let assignment = Assignment::new(user_id, &id.to_string(), item.name())
            .with_created_at(Utc::now());
        state
            .assignments
            .entry(user_id.to_string())
            .or_default()
            .insert(item.name().to_string(), assignment);
        Ok(())
    }

    fn remove_assignment(&self, user_id: &str, assignment: &Assignment) -> StorageResult<()> {
        let mut state = self.write()?;
        if let Some(assignments) = state.assignments.get_mut(user_id) {
            assignments.remove(&assignment.item_name);
            if assignments.is_empty() {
                state.assignments.remove(user_id);
            }
        }
        Ok(())
    }

    fn remove_all_assignments(&self, user_id: &str) -> StorageResult<()> {
        self.write()?.assignments.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rbac::item::{Permission, Role};

    fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.add_item(&Role::new("admin").into()).unwrap();
        storage.add_item(&Role::new("editor").into()).unwrap();
        storage.add_item(&Permission::new("publish").into()).unwrap();
        storage
            .add_child(&Item::new(ItemType::Role, "admin"), &Item::new(ItemType::Role, "editor"))
            .unwrap();
        storage
            .add_child(
                &Item::new(ItemType::Role, "editor"),
                &Item::new(ItemType::Permission, "publish"),
            )
            .unwrap();
        storage
            .add_assignment("1", &Item::new(ItemType::Role, "editor"))
            .unwrap();
        storage
    }

    #[test]
    fn test_children_snapshot() {
        let storage = seeded();
        let children = storage.get_children().unwrap();

        assert_eq!(children.len(), 2);
        assert!(children["admin"].contains_key("editor"));
        assert!(storage.has_children("editor").unwrap());
        assert!(!storage.has_children("publish").unwrap());
    }

    #[test]
    fn test_rename_sweeps_edges_and_assignments() {
        let storage = seeded();
        let renamed: Item = Role::new("writer").into();
        storage.update_item("editor", &renamed).unwrap();

        assert!(storage.get_item_by_name("editor").unwrap().is_none());
        assert!(storage.get_children_by_name("admin").unwrap().contains_key("writer"));
        assert!(storage.get_children_by_name("writer").unwrap().contains_key("publish"));

        let assignment = storage.get_user_assignment_by_name("1", "writer").unwrap().unwrap();
        assert_eq!(assignment.item_name, "writer");
        assert!(storage
            .get_item_by_name("writer")
            .unwrap()
            .unwrap()
            .has_updated_time());
    }

    #[test]
    fn test_remove_item_strips_references() {
        let storage = seeded();
        storage.remove_item(&Item::new(ItemType::Role, "editor")).unwrap();

        assert!(storage.get_children().unwrap().is_empty());
        assert!(storage.get_user_assignments("1").unwrap().is_empty());
        assert!(storage.get_permission_by_name("publish").unwrap().is_some());
    }

    #[test]
    fn test_clear_permissions_keeps_roles() {
        let storage = seeded();
        storage.clear_permissions().unwrap();

        assert!(storage.get_permissions().unwrap().is_empty());
        assert_eq!(storage.get_roles().unwrap().len(), 2);
        assert!(!storage.has_children("editor").unwrap());
    }

    #[test]
    fn test_edge_to_unknown_item_is_rejected() {
        let storage = seeded();
        let result = storage.add_child(
            &Item::new(ItemType::Role, "admin"),
            &Item::new(ItemType::Role, "ghost"),
        );
        assert!(matches!(result, Err(StorageError::ItemNotFound(name)) if name == "ghost"));
    }
}
