//! Default role configuration
//!
//! Roles every user holds without an assignment record. They can be given
//! as a literal list, produced lazily, or taken from a raw configuration
//! value.

use serde_json::Value;
use std::fmt;

use super::error::{RbacError, Result};

pub enum DefaultRoles {
    /// Literal role names
    List(Vec<String>),
    /// Called once when the roles are set; must yield an array of strings
    Producer(Box<dyn FnOnce() -> Value + Send>),
    /// Raw value, typically `default_roles` from the config file
    Value(Value),
}

impl DefaultRoles {
    pub fn producer(producer: impl FnOnce() -> Value + Send + 'static) -> Self {
        DefaultRoles::Producer(Box::new(producer))
    }

    pub(crate) fn resolve(self) -> Result<Vec<String>> {
        match self {
            DefaultRoles::List(roles) => Ok(roles),
            DefaultRoles::Producer(producer) => {
                let produced = producer();
                role_names(&produced).ok_or_else(|| RbacError::InvalidProducerResult(produced.to_string()))
            }
            DefaultRoles::Value(value) => role_names(&value).ok_or(RbacError::InvalidDefaultRoles),
        }
    }
}

fn role_names(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

impl fmt::Debug for DefaultRoles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultRoles::List(roles) => f.debug_tuple("List").field(roles).finish(),
            DefaultRoles::Producer(_) => f.write_str("Producer(..)"),
            DefaultRoles::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<Vec<String>> for DefaultRoles {
    fn from(roles: Vec<String>) -> Self {
        DefaultRoles::List(roles)
    }
}

impl From<Vec<&str>> for DefaultRoles {
    fn from(roles: Vec<&str>) -> Self {
        DefaultRoles::List(roles.into_iter().map(str::to_string).collect())
    }
}

impl From<Value> for DefaultRoles {
    fn from(value: Value) -> Self {
        DefaultRoles::Value(value)
    }
}
