use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use restime_core::tag::AccessorResult;
use restime_core::{HandlerFailure, TagSource, TagValue};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: u64,
    pub owner_id: u64,
    pub name: String,
}

/// Request body of `POST /v1/items`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewItem {
    pub owner_id: u64,
    pub name: String,
}

impl TagSource for NewItem {
    fn tag_value(&self) -> TagValue {
        TagValue::Str(self.name.clone())
    }

    fn accessor(&self, name: &str) -> Option<AccessorResult> {
        match name {
            "ownerId" => Some(Ok(self.owner_id.into())),
            "name" => Some(Ok(self.name.as_str().into())),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ItemStoreError {
    #[error("item store is full (capacity {0})")]
    Full(usize),
}

impl HandlerFailure for ItemStoreError {}

/// In-memory item store with a fixed capacity.
pub struct ItemStore {
    items: DashMap<u64, Item>,
    next_id: AtomicU64,
    capacity: usize,
    // serializes the capacity check with the insert
    insert_lock: Mutex<()>,
}

impl ItemStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity,
            insert_lock: Mutex::new(()),
        }
    }

    pub fn insert(&self, new: &NewItem) -> Result<Item, ItemStoreError> {
        // Poisoned lock only means another insert panicked; the map is still consistent.
        let _guard = self.insert_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.items.len() >= self.capacity {
            return Err(ItemStoreError::Full(self.capacity));
        }
        let item = Item {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            owner_id: new.owner_id,
            name: new.name.clone(),
        };
        self.items.insert(item.id, item.clone());
        Ok(item)
    }

    pub fn get(&self, id: u64) -> Option<Item> {
        self.items.get(&id).map(|r| r.value().clone())
    }

    pub fn remove(&self, id: u64) -> Option<Item> {
        self.items.remove(&id).map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
