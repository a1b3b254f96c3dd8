//! Authorization Items
//!
//! Roles, permissions and user assignments as immutable values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::RbacError;

/// Item kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Role,
    Permission,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Role => "role",
            ItemType::Permission => "permission",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role" => Ok(ItemType::Role),
            "permission" => Ok(ItemType::Permission),
            other => Err(RbacError::UnknownItemType(other.to_string())),
        }
    }
}

/// Attributes shared by roles and permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAttributes {
    /// Globally unique item name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Optional resource path the item guards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_time: Option<DateTime<Utc>>,
}

impl ItemAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            path: None,
            created_time: None,
            updated_time: None,
        }
    }
}

/// Common read access and functional updates for every item kind.
///
/// The `with_*` methods consume the value and hand back an updated copy;
/// nothing is ever changed behind a shared reference.
pub trait AuthItem: Clone {
    fn item_type(&self) -> ItemType;

    fn attributes(&self) -> &ItemAttributes;

    /// Apply `update` to the attributes of an owned value
    fn with_attributes(self, update: impl FnOnce(&mut ItemAttributes)) -> Self;

    /// Convert into the storage-level sum type
    fn to_item(&self) -> Item;

    fn name(&self) -> &str {
        &self.attributes().name
    }

    fn description(&self) -> &str {
        &self.attributes().description
    }

    fn path(&self) -> Option<&str> {
        self.attributes().path.as_deref()
    }

    fn created_time(&self) -> Option<DateTime<Utc>> {
        self.attributes().created_time
    }

    fn updated_time(&self) -> Option<DateTime<Utc>> {
        self.attributes().updated_time
    }

    fn has_created_time(&self) -> bool {
        self.attributes().created_time.is_some()
    }

    fn has_updated_time(&self) -> bool {
        self.attributes().updated_time.is_some()
    }

    fn with_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_attributes(|a| a.name = name)
    }

    fn with_description(self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.with_attributes(|a| a.description = description)
    }

    fn with_path(self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.with_attributes(|a| a.path = Some(path))
    }

    fn with_created_time(self, time: Option<DateTime<Utc>>) -> Self {
        self.with_attributes(|a| a.created_time = time)
    }

    fn with_updated_time(self, time: Option<DateTime<Utc>>) -> Self {
        self.with_attributes(|a| a.updated_time = time)
    }
}

/// A role: may parent both roles and permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(ItemAttributes);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(ItemAttributes::new(name))
    }
}

impl AuthItem for Role {
    fn item_type(&self) -> ItemType {
        ItemType::Role
    }

    fn attributes(&self) -> &ItemAttributes {
        &self.0
    }

    fn with_attributes(mut self, update: impl FnOnce(&mut ItemAttributes)) -> Self {
        update(&mut self.0);
        self
    }

    fn to_item(&self) -> Item {
        Item::Role(self.clone())
    }
}

/// A permission: a leaf with respect to roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(ItemAttributes);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(ItemAttributes::new(name))
    }
}

impl AuthItem for Permission {
    fn item_type(&self) -> ItemType {
        ItemType::Permission
    }

    fn attributes(&self) -> &ItemAttributes {
        &self.0
    }

    fn with_attributes(mut self, update: impl FnOnce(&mut ItemAttributes)) -> Self {
        update(&mut self.0);
        self
    }

    fn to_item(&self) -> Item {
        Item::Permission(self.clone())
    }
}

/// A node of the authorization hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    Role(Role),
    Permission(Permission),
}

impl Item {
    pub fn new(item_type: ItemType, name: impl Into<String>) -> Self {
        match item_type {
            ItemType::Role => Item::Role(Role::new(name)),
            ItemType::Permission => Item::Permission(Permission::new(name)),
        }
    }

    /// Rebuild an item of the given kind from stored attributes
    pub fn from_attributes(item_type: ItemType, attributes: ItemAttributes) -> Self {
        match item_type {
            ItemType::Role => Item::Role(Role(attributes)),
            ItemType::Permission => Item::Permission(Permission(attributes)),
        }
    }

    pub fn is_role(&self) -> bool {
        matches!(self, Item::Role(_))
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, Item::Permission(_))
    }

    pub fn into_role(self) -> Option<Role> {
        match self {
            Item::Role(role) => Some(role),
            Item::Permission(_) => None,
        }
    }

    pub fn into_permission(self) -> Option<Permission> {
        match self {
            Item::Permission(permission) => Some(permission),
            Item::Role(_) => None,
        }
    }
}

impl AuthItem for Item {
    fn item_type(&self) -> ItemType {
        match self {
            Item::Role(_) => ItemType::Role,
            Item::Permission(_) => ItemType::Permission,
        }
    }

    fn attributes(&self) -> &ItemAttributes {
        match self {
            Item::Role(role) => role.attributes(),
            Item::Permission(permission) => permission.attributes(),
        }
    }

    fn with_attributes(self, update: impl FnOnce(&mut ItemAttributes)) -> Self {
        match self {
            Item::Role(role) => Item::Role(role.with_attributes(update)),
            Item::Permission(permission) => Item::Permission(permission.with_attributes(update)),
        }
    }

    fn to_item(&self) -> Item {
        self.clone()
    }
}

impl From<Role> for Item {
    fn from(role: Role) -> Self {
        Item::Role(role)
    }
}

impl From<Permission> for Item {
    fn from(permission: Permission) -> Self {
        Item::Permission(permission)
    }
}

/// A role or permission granted directly to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub user_id: String,
    /// Storage identifier of the assigned item
    pub item_id: String,
    pub item_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn new(user_id: &str, item_id: &str, item_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            item_name: item_name.to_string(),
            created_at: None,
        }
    }

    pub fn with_item_id(mut self, item_id: &str) -> Self {
        self.item_id = item_id.to_string();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}
