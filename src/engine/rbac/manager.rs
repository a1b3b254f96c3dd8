//! RBAC Manager
//!
//! Policy engine over a [`Storage`] backend: hierarchy maintenance with
//! cycle prevention, user assignments, and permission resolution. The
//! manager keeps no graph state of its own; every call works on whatever
//! the storage currently returns.

use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::default_roles::DefaultRoles;
use super::error::{RbacError, Result};
use super::hierarchy::Hierarchy;
use super::item::{Assignment, AuthItem, Item, ItemType, Permission, Role};
use super::storage::{AssignmentMap, ItemMap, Storage};

/// Opaque data handed through permission checks
pub type Parameters = serde_json::Map<String, Value>;

/// Permissions indexed by name
pub type PermissionMap = BTreeMap<String, Permission>;

/// Roles indexed by name
pub type RoleMap = BTreeMap<String, Role>;

/// A user's permissions split by origin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedPermissions {
    /// Assigned straight to the user
    pub direct: PermissionMap,
    /// Reached by descending from the user's assigned items
    pub inherited: PermissionMap,
}

impl GroupedPermissions {
    /// Merge into one map; inherited entries win on name collision
    pub fn merged(self) -> PermissionMap {
        let mut merged = self.direct;
        merged.extend(self.inherited);
        merged
    }
}

pub struct Manager<S: Storage> {
    storage: S,
    default_roles: Vec<String>,
    /// Serializes check-then-act sequences between concurrent callers
    write_lock: Mutex<()>,
}

impl<S: Storage> Manager<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            default_roles: Vec::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_default_roles(storage: S, roles: impl Into<DefaultRoles>) -> Result<Self> {
        let mut manager = Self::new(storage);
        manager.set_default_roles(roles)?;
        Ok(manager)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn serialize(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hierarchy(&self) -> Result<Hierarchy> {
        Ok(Hierarchy::new(self.storage.get_children()?))
    }

    fn has_item(&self, name: &str) -> Result<bool> {
        Ok(self.storage.get_item_by_name(name)?.is_some())
    }

    fn require_item(&self, item: &impl AuthItem) -> Result<Item> {
        self.storage
            .get_item_by_name(item.name())?
            .ok_or_else(|| RbacError::ItemNotFound {
                item_type: item.item_type(),
                name: item.name().to_string(),
            })
    }

    // ========== Permission checks ==========

    /// Whether `user_id` may exercise `permission_name`.
    ///
    /// `parameters` is carried for rule hooks and not interpreted here.
    pub fn user_has_permission(
        &self,
        user_id: &str,
        permission_name: &str,
        parameters: &Parameters,
    ) -> Result<bool> {
        let assignments = self.storage.get_user_assignments(user_id)?;

        if assignments.is_empty() && self.default_roles.is_empty() {
            return Ok(false);
        }

        if self.storage.get_permission_by_name(permission_name)?.is_none() {
            return Ok(false);
        }

        let items = self.storage.get_items()?;
        let hierarchy = self.hierarchy()?;
        let granted = Self::user_has_permission_recursive(permission_name, &assignments, &items, &hierarchy);

        debug!(
            user_id,
            permission = permission_name,
            parameters = parameters.len(),
            granted,
            "permission check"
        );
        Ok(granted)
    }

    /// Ascend from `item_name` towards its ancestors until one of them is
    /// directly assigned.
    fn user_has_permission_recursive(
        item_name: &str,
        assignments: &AssignmentMap,
        items: &ItemMap,
        hierarchy: &Hierarchy,
    ) -> bool {
        let mut stack = vec![item_name];
        let mut visited = HashSet::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name) || !items.contains_key(name) {
                continue;
            }
            if assignments.contains_key(name) {
                return true;
            }
            stack.extend(hierarchy.parents_of(name));
        }

        false
    }

    // ========== Hierarchy ==========

    fn can_be_parent(parent: &impl AuthItem, child: &impl AuthItem) -> bool {
        parent.item_type() != ItemType::Permission || child.item_type() != ItemType::Role
    }

    /// Whether `child` could be attached below `parent` without breaking the
    /// type rule or closing a cycle
    pub fn can_add_child(&self, parent: &impl AuthItem, child: &impl AuthItem) -> Result<bool> {
        Ok(Self::can_be_parent(parent, child)
            && !self.hierarchy()?.detect_loop(parent.name(), child.name()))
    }

    pub fn add_child(&self, parent: &impl AuthItem, child: &impl AuthItem) -> Result<()> {
        let _guard = self.serialize();

        let parent = self.require_item(parent)?;
        let child = self.require_item(child)?;

        if parent.name() == child.name() {
            return Err(RbacError::SelfReference(parent.name().to_string()));
        }

        if !Self::can_be_parent(&parent, &child) {
            return Err(RbacError::InvalidHierarchy {
                parent: parent.name().to_string(),
                child: child.name().to_string(),
            });
        }

        let hierarchy = self.hierarchy()?;
        if hierarchy.detect_loop(parent.name(), child.name()) {
            warn!(parent = parent.name(), child = child.name(), "rejected edge: loop detected");
            return Err(RbacError::LoopDetected {
                parent: parent.name().to_string(),
                child: child.name().to_string(),
            });
        }

        if hierarchy.has_child(parent.name(), child.name()) {
            return Err(RbacError::DuplicateChild {
                parent: parent.name().to_string(),
                child: child.name().to_string(),
            });
        }

        self.storage.add_child(&parent, &child)?;
        info!(parent = parent.name(), child = child.name(), "added child");
        Ok(())
    }

    /// Detach `child` from `parent`; the child item itself is kept
    pub fn remove_child(&self, parent: &impl AuthItem, child: &impl AuthItem) -> Result<()> {
        if self.has_child(parent, child)? {
            self.storage.remove_child(&parent.to_item(), &child.to_item())?;
            info!(parent = parent.name(), child = child.name(), "removed child");
        }
        Ok(())
    }

    /// Detach every child of `parent`; the children themselves are kept
    pub fn remove_children(&self, parent: &impl AuthItem) -> Result<()> {
        if self.storage.has_children(parent.name())? {
            self.storage.remove_children(&parent.to_item())?;
            info!(parent = parent.name(), "removed children");
        }
        Ok(())
    }

    pub fn has_child(&self, parent: &impl AuthItem, child: &impl AuthItem) -> Result<bool> {
        Ok(self
            .storage
            .get_children_by_name(parent.name())?
            .contains_key(child.name()))
    }

    // ========== Assignments ==========

    /// Grant `item` to `user_id` and return the stored assignment.
    ///
    /// Fails when the name is already among the user's resolved permissions
    /// (direct or inherited) or directly assigned.
    pub fn assign(&self, item: &impl AuthItem, user_id: &str) -> Result<Assignment> {
        let _guard = self.serialize();

        let stored = self.require_item(item)?;

        let already_held = self.get_permissions_by_user(user_id)?.contains_key(stored.name())
            || self
                .storage
                .get_user_assignment_by_name(user_id, stored.name())?
                .is_some();
        if already_held {
            return Err(RbacError::AlreadyAssigned {
                item_type: stored.item_type(),
                name: stored.name().to_string(),
                user_id: user_id.to_string(),
            });
        }

        self.storage.add_assignment(user_id, &stored)?;
        info!(user_id, item = stored.name(), "assigned");

        self.storage
            .get_user_assignment_by_name(user_id, stored.name())?
            .ok_or_else(|| RbacError::AssignmentNotFound {
                name: stored.name().to_string(),
                user_id: user_id.to_string(),
            })
    }

    /// Remove a direct assignment
    pub fn revoke(&self, item: &impl AuthItem, user_id: &str) -> Result<()> {
        let assignment = self
            .storage
            .get_user_assignment_by_name(user_id, item.name())?
            .ok_or_else(|| RbacError::AssignmentNotFound {
                name: item.name().to_string(),
                user_id: user_id.to_string(),
            })?;

        self.storage.remove_assignment(user_id, &assignment)?;
        info!(user_id, item = item.name(), "revoked");
        Ok(())
    }

    pub fn revoke_all(&self, user_id: &str) -> Result<()> {
        self.storage.remove_all_assignments(user_id)?;
        info!(user_id, "revoked all assignments");
        Ok(())
    }

    // ========== Role and permission queries ==========

    /// Default roles plus roles assigned directly to the user. Child roles
    /// reached through the hierarchy are not included.
    pub fn get_roles_by_user(&self, user_id: &str) -> Result<RoleMap> {
        let mut roles = self.get_default_role_instances();
        let stored = self.storage.get_roles()?;

        for (name, assignment) in self.storage.get_user_assignments(user_id)? {
            if let Some(role) = stored.get(&assignment.item_name) {
                roles.insert(name, role.clone());
            }
        }

        Ok(roles)
    }

    /// `role_name` itself plus every role below it, at any depth
    pub fn get_child_roles(&self, role_name: &str) -> Result<RoleMap> {
        let role = self
            .storage
            .get_role_by_name(role_name)?
            .ok_or_else(|| RbacError::RoleNotFound(role_name.to_string()))?;

        let mut descendants = BTreeSet::new();
        self.hierarchy()?.children_recursive(role_name, &mut descendants);

        let mut result: RoleMap = self
            .storage
            .get_roles()?
            .into_iter()
            .filter(|(name, _)| descendants.contains(name))
            .collect();
        result.insert(role_name.to_string(), role);
        Ok(result)
    }

    /// Every permission below `role_name`, at any depth
    pub fn get_permissions_by_role(&self, role_name: &str) -> Result<PermissionMap> {
        let mut descendants = BTreeSet::new();
        self.hierarchy()?.children_recursive(role_name, &mut descendants);

        if descendants.is_empty() {
            return Ok(PermissionMap::new());
        }
        self.normalize_permissions(&descendants)
    }

    /// All permissions a user holds, direct and inherited merged by name
    pub fn get_permissions_by_user(&self, user_id: &str) -> Result<PermissionMap> {
        Ok(self.get_grouped_permissions_by_user(user_id)?.merged())
    }

    pub fn get_grouped_permissions_by_user(&self, user_id: &str) -> Result<GroupedPermissions> {
        Ok(GroupedPermissions {
            direct: self.get_direct_permissions_by_user(user_id)?,
            inherited: self.get_inherited_permissions_by_user(user_id)?,
        })
    }

    fn get_direct_permissions_by_user(&self, user_id: &str) -> Result<PermissionMap> {
        let stored = self.storage.get_permissions()?;

        Ok(self
            .storage
            .get_user_assignments(user_id)?
            .into_iter()
            .filter_map(|(name, assignment)| {
                stored
                    .get(&assignment.item_name)
                    .map(|permission| (name, permission.clone()))
            })
            .collect())
    }

    /// Permissions reached by descending from every item assigned to the user
    pub fn get_inherited_permissions_by_user(&self, user_id: &str) -> Result<PermissionMap> {
        let assignments = self.storage.get_user_assignments(user_id)?;
        let hierarchy = self.hierarchy()?;

        let mut descendants = BTreeSet::new();
        for name in assignments.keys() {
            hierarchy.children_recursive(name, &mut descendants);
        }

        if descendants.is_empty() {
            return Ok(PermissionMap::new());
        }
        self.normalize_permissions(&descendants)
    }

    fn normalize_permissions(&self, names: &BTreeSet<String>) -> Result<PermissionMap> {
        Ok(self
            .storage
            .get_permissions()?
            .into_iter()
            .filter(|(name, _)| names.contains(name))
            .collect())
    }

    /// Users assigned `role_name` or any role that contains it.
    ///
    /// Each user appears once, in user id order, however many of their
    /// assignments match.
    pub fn get_user_ids_by_role(&self, role_name: &str) -> Result<Vec<String>> {
        let mut roles = HashSet::new();
        roles.insert(role_name.to_string());
        roles.extend(self.hierarchy()?.parents_recursive(role_name));

        Ok(self
            .storage
            .get_assignments()?
            .into_iter()
            .filter(|(_, assignments)| {
                assignments
                    .values()
                    .any(|assignment| roles.contains(&assignment.item_name))
            })
            .map(|(user_id, _)| user_id)
            .collect())
    }

    // ========== Item maintenance ==========

    pub fn add_role(&self, role: Role) -> Result<()> {
        self.add_item(role.into())
    }

    pub fn remove_role(&self, role: &Role) -> Result<()> {
        self.remove_item(role)
    }

    pub fn update_role(&self, name: &str, role: Role) -> Result<()> {
        self.update_item(name, role.into())
    }

    pub fn add_permission(&self, permission: Permission) -> Result<()> {
        self.add_item(permission.into())
    }

    pub fn remove_permission(&self, permission: &Permission) -> Result<()> {
        self.remove_item(permission)
    }

    pub fn update_permission(&self, name: &str, permission: Permission) -> Result<()> {
        self.update_item(name, permission.into())
    }

    /// Register an item, stamping creation and update times when absent
    fn add_item(&self, item: Item) -> Result<()> {
        let _guard = self.serialize();

        if self.has_item(item.name())? {
            return Err(RbacError::NameCollision(item.name().to_string()));
        }

        let now = Utc::now();
        let item = if item.has_created_time() {
            item
        } else {
            item.with_created_time(Some(now))
        };
        let item = if item.has_updated_time() {
            item
        } else {
            item.with_updated_time(Some(now))
        };

        self.storage.add_item(&item)?;
        info!(item_type = %item.item_type(), name = item.name(), "added item");
        Ok(())
    }

    /// Remove the stored item when both name and type match
    fn remove_item(&self, item: &impl AuthItem) -> Result<()> {
        let stored = self.storage.get_item_by_name(item.name())?;
        if stored.is_some_and(|stored| stored.item_type() == item.item_type()) {
            self.storage.remove_item(&item.to_item())?;
            info!(item_type = %item.item_type(), name = item.name(), "removed item");
        }
        Ok(())
    }

    fn update_item(&self, name: &str, item: Item) -> Result<()> {
        let _guard = self.serialize();

        let stored = self
            .storage
            .get_item_by_name(name)?
            .ok_or_else(|| RbacError::ItemNotFound {
                item_type: item.item_type(),
                name: name.to_string(),
            })?;
        if stored.item_type() != item.item_type() {
            return Err(RbacError::TypeChange {
                name: name.to_string(),
                from: stored.item_type(),
                to: item.item_type(),
            });
        }
        self.check_item_name_for_update(&item, name)?;

        self.storage.update_item(name, &item)?;
        info!(from = name, to = item.name(), "updated item");
        Ok(())
    }

    fn check_item_name_for_update(&self, item: &Item, name: &str) -> Result<()> {
        if item.name() == name || !self.has_item(item.name())? {
            return Ok(());
        }
        Err(RbacError::NameCollision(item.name().to_string()))
    }

    // ========== Default roles ==========

    /// Replace the default roles from a list, a producer, or a raw value
    pub fn set_default_roles(&mut self, roles: impl Into<DefaultRoles>) -> Result<&mut Self> {
        self.default_roles = roles.into().resolve()?;
        debug!(roles = ?self.default_roles, "default roles set");
        Ok(self)
    }

    pub fn get_default_roles(&self) -> &[String] {
        &self.default_roles
    }

    /// Default roles as fresh `Role` values, indexed by name
    pub fn get_default_role_instances(&self) -> RoleMap {
        self.default_roles
            .iter()
            .map(|name| (name.clone(), Role::new(name.as_str())))
            .collect()
    }

    /// Drop storage-side caches
    pub fn clear_loaded_items(&self) {
        self.storage.clear_loaded_items();
    }
}
