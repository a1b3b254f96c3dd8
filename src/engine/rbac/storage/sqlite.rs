//! SQLite RBAC storage
//!
//! Items, edges and assignments live in three tables. Edges and assignments
//! reference items by row id with `ON DELETE CASCADE`, so renames and
//! removals stay consistent without a manual sweep.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use super::{
    AssignmentMap, ChildrenMap, ItemMap, Storage, StorageError, StorageResult, UserAssignmentMap,
};
use crate::engine::config::TableConfig;
use crate::engine::database::{Database, DbConnection};
use crate::engine::rbac::item::{Assignment, AuthItem, Item, ItemAttributes, ItemType};

/// Raw item columns, converted outside the rusqlite row closure
struct ItemRow {
    name: String,
    item_type: String,
    description: String,
    path: Option<String>,
    created_time: Option<String>,
    updated_time: Option<String>,
}

impl ItemRow {
    /// Reads the six item columns starting at `offset`
    fn read(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(offset)?,
            item_type: row.get(offset + 1)?,
            description: row.get(offset + 2)?,
            path: row.get(offset + 3)?,
            created_time: row.get(offset + 4)?,
            updated_time: row.get(offset + 5)?,
        })
    }

    fn into_item(self) -> StorageResult<Item> {
        let item_type: ItemType = self
            .item_type
            .parse()
            .map_err(|_| StorageError::InvalidRow(format!("{}: unknown type {}", self.name, self.item_type)))?;

        let attributes = ItemAttributes {
            created_time: parse_time(self.created_time.as_deref())?,
            updated_time: parse_time(self.updated_time.as_deref())?,
            name: self.name,
            description: self.description,
            path: self.path,
        };
        Ok(Item::from_attributes(item_type, attributes))
    }
}

fn parse_time(value: Option<&str>) -> StorageResult<Option<DateTime<Utc>>> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StorageError::InvalidRow(format!("bad timestamp {}: {}", raw, e)))
        })
        .transpose()
}

fn format_time(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339())
}

/// Storage backed by a pooled SQLite database
pub struct SqliteStorage {
    db: Database,
    items_loaded: RwLock<Option<ItemMap>>,
    /// Bumped by every invalidation, under the `items_loaded` write lock
    generation: AtomicU64,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            items_loaded: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn tables(&self) -> &TableConfig {
        self.db.tables()
    }

    fn conn(&self) -> StorageResult<DbConnection> {
        Ok(self.db.get_connection()?)
    }

    fn invalidate(&self) {
        let mut loaded = self
            .items_loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *loaded = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Cache `items` unless an invalidation happened since `generation` was
    /// read, in which case the snapshot may predate a committed write.
    fn cache_if_current(&self, generation: u64, items: &ItemMap) {
        let mut loaded = self
            .items_loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) == generation {
            *loaded = Some(items.clone());
        }
    }

    fn load_items(&self) -> StorageResult<ItemMap> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT name, type, description, path, created_time, updated_time FROM {} ORDER BY id",
            self.tables().item
        ))?;
        let rows = stmt
            .query_map([], |row| ItemRow::read(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = ItemMap::new();
        for row in rows {
            let item = row.into_item()?;
            items.insert(item.name().to_string(), item);
        }
        debug!(count = items.len(), "loaded authorization items");
        Ok(items)
    }

    fn delete_items_of_type(&self, item_type: ItemType) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE type = ?1", self.tables().item),
            [item_type.as_str()],
        )?;
        self.invalidate();
        Ok(())
    }

    fn query_assignments(&self, user_id: Option<&str>) -> StorageResult<Vec<Assignment>> {
        let TableConfig { item, assignment, .. } = self.tables();
        let mut sql = format!(
            "SELECT a.user_id, a.item_id, i.name, a.created_at FROM {assignment} a \
             JOIN {item} i ON i.id = a.item_id"
        );
        if user_id.is_some() {
            sql.push_str(" WHERE a.user_id = ?1");
        }
        sql.push_str(" ORDER BY a.user_id, a.rowid");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &Row<'_>| -> rusqlite::Result<(String, i64, String, Option<String>)> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        };
        let rows = match user_id {
            Some(user_id) => stmt.query_map([user_id], map_row)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?,
        };

        rows.into_iter()
            .map(|(user_id, item_id, item_name, created_at)| {
                let assignment = Assignment::new(&user_id, &item_id.to_string(), &item_name);
                Ok(match parse_time(created_at.as_deref())? {
                    Some(created_at) => assignment.with_created_at(created_at),
                    None => assignment,
                })
            })
            .collect()
    }
}

impl Storage for SqliteStorage {
    fn get_items(&self) -> StorageResult<ItemMap> {
        if let Ok(loaded) = self.items_loaded.read() {
            if let Some(items) = loaded.as_ref() {
                return Ok(items.clone());
            }
        }

        let generation = self.generation.load(Ordering::Acquire);
        let items = self.load_items()?;
        self.cache_if_current(generation, &items);
        Ok(items)
    }

    fn add_item(&self, item: &Item) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (name, type, description, path, created_time, updated_time) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.tables().item
            ),
            params![
                item.name(),
                item.item_type().as_str(),
                item.description(),
                item.path(),
                format_time(item.created_time()),
                format_time(item.updated_time()),
            ],
        )?;
        self.invalidate();
        Ok(())
    }

    fn update_item(&self, name: &str, item: &Item) -> StorageResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET name = ?1, type = ?2, description = ?3, path = ?4, \
                 created_time = ?5, updated_time = ?6 WHERE name = ?7",
                self.tables().item
            ),
            params![
                item.name(),
                item.item_type().as_str(),
                item.description(),
                item.path(),
                format_time(item.created_time()),
                format_time(Some(Utc::now())),
                name,
            ],
        )?;
        self.invalidate();

        if updated == 0 {
            return Err(StorageError::ItemNotFound(name.to_string()));
        }
        Ok(())
    }

    fn remove_item(&self, item: &Item) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE name = ?1", self.tables().item),
            [item.name()],
        )?;
        self.invalidate();
        Ok(())
    }

    fn clear_roles(&self) -> StorageResult<()> {
        self.delete_items_of_type(ItemType::Role)
    }

    fn clear_permissions(&self) -> StorageResult<()> {
        self.delete_items_of_type(ItemType::Permission)
    }

    fn get_children(&self) -> StorageResult<ChildrenMap> {
        let TableConfig { item, item_child, .. } = self.tables();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT p.name, c.name, c.type, c.description, c.path, c.created_time, c.updated_time \
             FROM {item_child} e \
             JOIN {item} p ON p.id = e.parent \
             JOIN {item} c ON c.id = e.child"
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, ItemRow::read(row, 1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut children = ChildrenMap::new();
        for (parent, row) in rows {
            let child = row.into_item()?;
            children
                .entry(parent)
                .or_default()
                .insert(child.name().to_string(), child);
        }
        Ok(children)
    }

    fn get_children_by_name(&self, name: &str) -> StorageResult<ItemMap> {
        let TableConfig { item, item_child, .. } = self.tables();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.name, c.type, c.description, c.path, c.created_time, c.updated_time \
             FROM {item_child} e \
             JOIN {item} p ON p.id = e.parent \
             JOIN {item} c ON c.id = e.child \
             WHERE p.name = ?1"
        ))?;
        let rows = stmt
            .query_map([name], |row| ItemRow::read(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut children = ItemMap::new();
        for row in rows {
            let child = row.into_item()?;
            children.insert(child.name().to_string(), child);
        }
        Ok(children)
    }

    fn add_child(&self, parent: &Item, child: &Item) -> StorageResult<()> {
        let TableConfig { item, item_child, .. } = self.tables();
        let conn = self.conn()?;
        let inserted = conn.execute(
            &format!(
                "INSERT INTO {item_child} (parent, child) \
                 SELECT p.id, c.id FROM {item} p, {item} c WHERE p.name = ?1 AND c.name = ?2"
            ),
            [parent.name(), child.name()],
        )?;
        drop(conn);

        if inserted == 0 {
            let missing = if self.get_item_by_name(parent.name())?.is_none() {
                parent.name()
            } else {
                child.name()
            };
            return Err(StorageError::ItemNotFound(missing.to_string()));
        }
        Ok(())
    }

    fn remove_child(&self, parent: &Item, child: &Item) -> StorageResult<()> {
        let TableConfig { item, item_child, .. } = self.tables();
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "DELETE FROM {item_child} \
                 WHERE parent = (SELECT id FROM {item} WHERE name = ?1) \
                 AND child = (SELECT id FROM {item} WHERE name = ?2)"
            ),
            [parent.name(), child.name()],
        )?;
        Ok(())
    }

    fn remove_children(&self, parent: &Item) -> StorageResult<()> {
        let TableConfig { item, item_child, .. } = self.tables();
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "DELETE FROM {item_child} WHERE parent = (SELECT id FROM {item} WHERE name = ?1)"
            ),
            [parent.name()],
        )?;
        Ok(())
    }

    fn get_assignments(&self) -> StorageResult<UserAssignmentMap> {
        let mut result = UserAssignmentMap::new();
        for assignment in self.query_assignments(None)? {
            result
                .entry(assignment.user_id.clone())
                .or_insert_with(BTreeMap::new)
                .insert(assignment.item_name.clone(), assignment);
        }
        Ok(result)
    }

    fn get_user_assignments(&self, user_id: &str) -> StorageResult<AssignmentMap> {
        Ok(self
            .query_assignments(Some(user_id))?
            .into_iter()
            .map(|assignment| (assignment.item_name.clone(), assignment))
            .collect())
    }

    fn get_user_assignment_by_name(&self, user_id: &str, name: &str) -> StorageResult<Option<Assignment>> {
        let TableConfig { item, assignment, .. } = self.tables();
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT a.item_id, a.created_at FROM {assignment} a \
                     JOIN {item} i ON i.id = a.item_id \
                     WHERE a.user_id = ?1 AND i.name = ?2"
                ),
                [user_id, name],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        row.map(|(item_id, created_at)| {
            let assignment = Assignment::new(user_id, &item_id.to_string(), name);
            Ok(match parse_time(created_at.as_deref())? {
                Some(created_at) => assignment.with_created_at(created_at),
                None => assignment,
            })
        })
        .transpose()
    }

    fn add_assignment(&self, user_id: &str, item: &Item) -> StorageResult<()> {
        let TableConfig {
            item: item_table,
            assignment,
            ..
        } = self.tables();
        let conn = self.conn()?;
        let inserted = conn.execute(
            &format!(
                "INSERT INTO {assignment} (item_id, user_id, created_at) \
                 SELECT id, ?2, ?3 FROM {item_table} WHERE name = ?1"
            ),
            params![item.name(), user_id, Utc::now().to_rfc3339()],
        )?;

        if inserted == 0 {
            return Err(StorageError::ItemNotFound(item.name().to_string()));
        }
        Ok(())
    }

    fn remove_assignment(&self, user_id: &str, assignment: &Assignment) -> StorageResult<()> {
        let TableConfig {
            item,
            assignment: assignment_table,
            ..
        } = self.tables();
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "DELETE FROM {assignment_table} \
                 WHERE user_id = ?1 AND item_id = (SELECT id FROM {item} WHERE name = ?2)"
            ),
            [user_id, assignment.item_name.as_str()],
        )?;
        Ok(())
    }

    fn remove_all_assignments(&self, user_id: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE user_id = ?1", self.tables().assignment),
            [user_id],
        )?;
        Ok(())
    }

    fn clear_loaded_items(&self) {
        self.invalidate();
    }
}
