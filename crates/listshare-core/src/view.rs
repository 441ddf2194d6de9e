use crate::model::{Item, ShoppingList};

/// Presentation projection of one list. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView {
    pub id: String,
    pub name: String,
    pub pending: Vec<Item>,
    pub completed: Vec<Item>,
    pub total: usize,
    pub progress: u8,
}

impl ListView {
    pub fn derive(list: &ShoppingList) -> Self {
        let (completed, pending): (Vec<Item>, Vec<Item>) =
            list.items.iter().cloned().partition(|item| item.completed);
        let total = list.items.len();

        Self {
            id: list.id.clone(),
            name: list.name.clone(),
            progress: completion_percent(completed.len(), total),
            pending,
            completed,
            total,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Pending items first, then completed: the order they are displayed
    /// and numbered in.
    pub fn display_order(&self) -> impl Iterator<Item = &Item> {
        self.pending.iter().chain(self.completed.iter())
    }
}

/// `round(100 * completed / total)`, or 0 for an empty list.
pub fn completion_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = completed.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}
