use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::model::ShoppingList;
use crate::store::KeyValueStore;

pub const RECENTS_KEY: &str = "shopping_saved_lists";
pub const DEFAULT_CAPACITY: usize = 20;
pub const DEFAULT_PREVIEW: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentListEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "lastVisited")]
    pub last_visited_at: DateTime<Utc>,
    #[serde(default)]
    pub item_count: usize,
    #[serde(default)]
    pub preview_names: Vec<String>,
}

impl RecentListEntry {
    pub fn from_snapshot(list: &ShoppingList, now: DateTime<Utc>, preview: usize) -> Self {
        Self {
            id: list.id.clone(),
            name: list.name.clone(),
            last_visited_at: now,
            item_count: list.items.len(),
            preview_names: list
                .items
                .iter()
                .take(preview)
                .map(|item| item.name.clone())
                .collect(),
        }
    }
}

/// Most-recently-visited-first record of lists opened in this profile,
/// unique by id and capped at `capacity` entries.
#[derive(Debug)]
pub struct RecentsCache<S> {
    store: S,
    capacity: usize,
    preview: usize,
    entries: Vec<RecentListEntry>,
}

impl<S: KeyValueStore> RecentsCache<S> {
    /// Reads the persisted entries. An absent, unreadable or malformed payload
    /// yields an empty cache.
    #[instrument(skip(store))]
    pub fn load(store: S, capacity: usize, preview: usize) -> Self {
        let entries = match store.get(RECENTS_KEY) {
            Ok(Some(raw)) => decode_entries(&raw, capacity),
            Ok(None) => Vec::new(),
            Err(error) => {
                warn!(%error, "failed reading recents; starting empty");
                Vec::new()
            }
        };
        debug!(count = entries.len(), "loaded recents");

        Self {
            store,
            capacity: capacity.max(1),
            preview,
            entries,
        }
    }

    pub fn with_defaults(store: S) -> Self {
        Self::load(store, DEFAULT_CAPACITY, DEFAULT_PREVIEW)
    }

    pub fn list(&self) -> &[RecentListEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&RecentListEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[instrument(skip(self, list), fields(list_id = %list.id))]
    pub fn upsert(&mut self, list: &ShoppingList, now: DateTime<Utc>) {
        self.entries.retain(|entry| entry.id != list.id);
        self.entries
            .insert(0, RecentListEntry::from_snapshot(list, now, self.preview));
        self.entries.truncate(self.capacity);
        self.persist();
    }

    /// Detaches a list from the recents without touching the rest's order.
    #[instrument(skip(self))]
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn persist(&mut self) {
        let payload = match serde_json::to_string(&self.entries) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "failed encoding recents");
                return;
            }
        };
        if let Err(error) = self.store.set(RECENTS_KEY, &payload) {
            warn!(%error, "failed persisting recents; keeping in-memory copy");
        }
    }
}

fn decode_entries(raw: &str, capacity: usize) -> Vec<RecentListEntry> {
    let values = match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(values) => values,
        Err(error) => {
            warn!(%error, "malformed recents payload; resetting");
            return Vec::new();
        }
    };

    let mut entries: Vec<RecentListEntry> = Vec::with_capacity(values.len());
    for (idx, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<RecentListEntry>(value) {
            Ok(entry) if entries.iter().all(|seen| seen.id != entry.id) => entries.push(entry),
            Ok(entry) => debug!(list_id = %entry.id, "dropping duplicate recents entry"),
            Err(error) => warn!(index = idx, %error, "skipping unreadable recents entry"),
        }
    }
    entries.truncate(capacity.max(1));
    entries
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::model::Item;
    use crate::store::MemoryStore;

    fn list(id: &str, names: &[&str]) -> ShoppingList {
        let mut list = ShoppingList::new(id, format!("list {id}"));
        for (idx, name) in names.iter().enumerate() {
            list.append(Item {
                id: format!("{id}-{idx}"),
                name: name.to_string(),
                completed: false,
            });
        }
        list
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
    }

    #[test]
    fn keeps_twenty_most_recent_first() {
        let mut cache = RecentsCache::with_defaults(MemoryStore::new());
        for n in 0..25 {
            cache.upsert(&list(&format!("id{n}"), &[]), t0() + Duration::minutes(n));
        }

        assert_eq!(cache.len(), 20);
        let ids: Vec<_> = cache.list().iter().map(|e| e.id.clone()).collect();
        let expected: Vec<_> = (5..25).rev().map(|n| format!("id{n}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn configured_capacity_bounds_the_cache() {
        assert_eq!(RecentsCache::load(MemoryStore::new(), 0, 3).capacity(), 1);

        let mut cache = RecentsCache::load(MemoryStore::new(), 3, 3);
        for n in 0..5 {
            cache.upsert(&list(&format!("id{n}"), &[]), t0() + Duration::minutes(n));
        }
        assert_eq!(cache.len(), cache.capacity());
        assert_eq!(cache.list()[0].id, "id4");
        assert!(cache.get("id1").is_none());
    }

    #[test]
    fn upsert_moves_existing_entry_to_front() {
        let mut cache = RecentsCache::with_defaults(MemoryStore::new());
        cache.upsert(&list("a", &[]), t0());
        cache.upsert(&list("b", &[]), t0());
        cache.upsert(&list("c", &[]), t0());
        cache.upsert(&list("a", &["milk"]), t0() + Duration::hours(1));

        let ids: Vec<_> = cache.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b"]);
        assert_eq!(cache.list()[0].item_count, 1);
        assert_eq!(cache.list()[0].last_visited_at, t0() + Duration::hours(1));
    }

    #[test]
    fn preview_is_capped_at_three_names() {
        let mut cache = RecentsCache::with_defaults(MemoryStore::new());
        cache.upsert(&list("a", &["milk", "bread", "eggs", "salt"]), t0());

        let entry = cache.get("a").expect("entry");
        assert_eq!(entry.item_count, 4);
        assert_eq!(entry.preview_names, ["milk", "bread", "eggs"]);
    }

    #[test]
    fn remove_preserves_order_of_the_rest() {
        let mut cache = RecentsCache::with_defaults(MemoryStore::new());
        for id in ["a", "b", "c", "d"] {
            cache.upsert(&list(id, &[]), t0());
        }
        assert!(cache.remove("c"));
        assert!(!cache.remove("c"));

        let ids: Vec<_> = cache.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["d", "b", "a"]);
    }

    #[test]
    fn survives_reload_through_the_store() {
        let mut cache = RecentsCache::with_defaults(MemoryStore::new());
        cache.upsert(&list("a", &["milk"]), t0());
        cache.upsert(&list("b", &[]), t0());

        let reloaded = RecentsCache::with_defaults(cache.into_store());
        let ids: Vec<_> = reloaded.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(reloaded.get("a").expect("a").preview_names, ["milk"]);
    }

    #[test]
    fn corrupted_payload_degrades_to_empty() {
        let store = MemoryStore::with_entry(RECENTS_KEY, "{not json");
        let cache = RecentsCache::with_defaults(store);
        assert!(cache.is_empty());

        let store = MemoryStore::with_entry(RECENTS_KEY, r#"{"id": "a"}"#);
        assert!(RecentsCache::with_defaults(store).is_empty());
    }

    #[test]
    fn legacy_and_partial_entries_are_accepted() {
        let raw = r#"[
            {"id": "old", "name": "Legacy", "lastVisited": "2025-12-01T08:00:00Z"},
            {"name": "no id"},
            {"id": "new", "name": "Fresh", "itemCount": 2, "extra": true}
        ]"#;
        let cache = RecentsCache::with_defaults(MemoryStore::with_entry(RECENTS_KEY, raw));

        assert_eq!(cache.len(), 2);
        let old = cache.get("old").expect("legacy entry");
        assert_eq!(
            old.last_visited_at,
            Utc.with_ymd_and_hms(2025, 12, 1, 8, 0, 0).unwrap()
        );
        assert!(old.preview_names.is_empty());
        assert_eq!(cache.get("new").expect("new entry").item_count, 2);
    }
}
