//! Item factory
//!
//! Builds roles and permissions from raw type strings, e.g. CLI or
//! config input.

use super::error::Result;
use super::item::{Item, ItemType};

pub struct ItemFactory;

impl ItemFactory {
    /// Create an item of the named type (`role` or `permission`)
    pub fn create(item_type: &str, name: &str) -> Result<Item> {
        let item_type: ItemType = item_type.parse()?;
        Ok(Item::new(item_type, name))
    }
}
