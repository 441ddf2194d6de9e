use listshare_shared::{ItemDto, ListDto};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of item ids minted locally for optimistic additions. The server
/// assigns the real id; the next authoritative snapshot replaces it.
pub const PROVISIONAL_ID_PREFIX: &str = "pending-";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub completed: bool,
}

impl Item {
    pub fn provisional(name: String) -> Self {
        Self {
            id: format!("{PROVISIONAL_ID_PREFIX}{}", Uuid::new_v4().simple()),
            name,
            completed: false,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PROVISIONAL_ID_PREFIX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShoppingList {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl ShoppingList {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.item(item_id).is_some()
    }

    pub fn append(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Flips `completed` on the matching item only. Returns false when the id
    /// is absent.
    pub fn toggle(&mut self, item_id: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == item_id) {
            Some(item) => {
                item.completed = !item.completed;
                true
            }
            None => false,
        }
    }

    pub fn rename(&mut self, item_id: &str, name: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == item_id) {
            Some(item) => {
                item.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, item_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != item_id);
        self.items.len() != before
    }
}

impl From<ItemDto> for Item {
    fn from(dto: ItemDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            completed: dto.completed,
        }
    }
}

impl From<ListDto> for ShoppingList {
    fn from(dto: ListDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            items: dto.items.into_iter().map(Item::from).collect(),
        }
    }
}

/// The single in-progress rename, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub item_id: String,
    pub draft_name: String,
}

/// Trims a user-entered name; `None` when nothing is left.
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShoppingList {
        let mut list = ShoppingList::new("l1", "Groceries");
        list.append(Item {
            id: "a".into(),
            name: "milk".into(),
            completed: false,
        });
        list.append(Item {
            id: "b".into(),
            name: "bread".into(),
            completed: true,
        });
        list
    }

    #[test]
    fn toggle_touches_only_the_matching_item() {
        let mut list = sample();
        assert!(list.toggle("a"));
        assert!(list.items[0].completed);
        assert!(list.items[1].completed);

        assert!(list.toggle("a"));
        assert_eq!(list, sample());
    }

    #[test]
    fn removing_an_absent_id_leaves_list_unchanged() {
        let mut list = sample();
        assert!(!list.remove("zzz"));
        assert_eq!(list, sample());
    }

    #[test]
    fn provisional_items_are_distinguishable() {
        let item = Item::provisional("eggs".into());
        assert!(item.is_provisional());
        assert!(!item.completed);
        assert!(!sample().items[0].is_provisional());
    }

    #[test]
    fn blank_names_normalize_to_none() {
        assert_eq!(normalize_name("   \t"), None);
        assert_eq!(normalize_name("  milk "), Some("milk".to_string()));
    }
}
