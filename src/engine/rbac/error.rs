//! RBAC Error Types

use thiserror::Error;

use super::item::ItemType;
use super::storage::StorageError;

/// Broad error categories callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Conflict,
    State,
    Storage,
}

#[derive(Error, Debug)]
pub enum RbacError {
    #[error("Unknown {item_type} \"{name}\"")]
    ItemNotFound { item_type: ItemType, name: String },

    #[error("Role \"{0}\" not found")]
    RoleNotFound(String),

    #[error("Cannot add \"{0}\" as a child of itself")]
    SelfReference(String),

    #[error("Cannot add \"{child}\" role as a child of \"{parent}\" permission")]
    InvalidHierarchy { parent: String, child: String },

    #[error("Unable to change the item name. The name \"{0}\" is already used by another item")]
    NameCollision(String),

    #[error("Cannot change \"{name}\" from {from} to {to}")]
    TypeChange {
        name: String,
        from: ItemType,
        to: ItemType,
    },

    #[error("Default roles must be a list of role names or a producer of one")]
    InvalidDefaultRoles,

    #[error("Default roles producer must return a list of role names, got: {0}")]
    InvalidProducerResult(String),

    #[error("Invalid item type: {0}")]
    UnknownItemType(String),

    #[error("Cannot add \"{child}\" as a child of \"{parent}\". A loop has been detected")]
    LoopDetected { parent: String, child: String },

    #[error("The item \"{parent}\" already has a child \"{child}\"")]
    DuplicateChild { parent: String, child: String },

    #[error("\"{name}\" {item_type} has already been assigned to user {user_id}")]
    AlreadyAssigned {
        item_type: ItemType,
        name: String,
        user_id: String,
    },

    #[error("\"{name}\" is not directly assigned to user {user_id}")]
    AssignmentNotFound { name: String, user_id: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RbacError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RbacError::ItemNotFound { .. } | RbacError::RoleNotFound(_) => ErrorKind::NotFound,
            RbacError::SelfReference(_)
            | RbacError::InvalidHierarchy { .. }
            | RbacError::NameCollision(_)
            | RbacError::TypeChange { .. }
            | RbacError::InvalidDefaultRoles
            | RbacError::InvalidProducerResult(_)
            | RbacError::UnknownItemType(_) => ErrorKind::InvalidArgument,
            RbacError::LoopDetected { .. }
            | RbacError::DuplicateChild { .. }
            | RbacError::AlreadyAssigned { .. } => ErrorKind::Conflict,
            RbacError::AssignmentNotFound { .. } => ErrorKind::State,
            RbacError::Storage(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, RbacError>;
