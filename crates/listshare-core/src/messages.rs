use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Local, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    Uk,
    En,
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uk" | "ua" | "uk-ua" => Ok(Self::Uk),
            "en" | "en-us" | "en-gb" => Ok(Self::En),
            other => Err(anyhow!("unsupported locale: {other}")),
        }
    }
}

/// User-visible failure notices, one per failure site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    ListNotFound,
    LoadFailed,
    CreateFailed,
    AddFailed,
    ToggleFailed,
    RenameFailed,
    DeleteFailed,
}

impl Notice {
    pub fn text(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::ListNotFound, Locale::Uk) => "Список не знайдено",
            (Self::LoadFailed, Locale::Uk) => "Помилка завантаження списку",
            (Self::CreateFailed, Locale::Uk) => "Помилка створення списку",
            (Self::AddFailed, Locale::Uk) => "Помилка додавання товару",
            (Self::ToggleFailed, Locale::Uk) => "Помилка оновлення товару",
            (Self::RenameFailed, Locale::Uk) => "Помилка редагування товару",
            (Self::DeleteFailed, Locale::Uk) => "Помилка видалення товару",
            (Self::ListNotFound, Locale::En) => "List not found",
            (Self::LoadFailed, Locale::En) => "Failed to load the list",
            (Self::CreateFailed, Locale::En) => "Failed to create the list",
            (Self::AddFailed, Locale::En) => "Failed to add the item",
            (Self::ToggleFailed, Locale::En) => "Failed to update the item",
            (Self::RenameFailed, Locale::En) => "Failed to rename the item",
            (Self::DeleteFailed, Locale::En) => "Failed to delete the item",
        }
    }
}

/// Static labels used by the text renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    DefaultTitle,
    Loading,
    Completed,
    Bought,
    EmptyList,
    Popular,
    NoRecents,
    Offline,
}

impl Label {
    pub fn text(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::DefaultTitle, Locale::Uk) => "Список покупок",
            (Self::Loading, Locale::Uk) => "Завантаження...",
            (Self::Completed, Locale::Uk) => "Куплено",
            (Self::Bought, Locale::Uk) => "куплено",
            (Self::EmptyList, Locale::Uk) => "Список порожній. Додайте перший товар!",
            (Self::Popular, Locale::Uk) => "Популярні товари",
            (Self::NoRecents, Locale::Uk) => "Немає збережених списків",
            (Self::Offline, Locale::Uk) => "синхронізацію зупинено",
            (Self::DefaultTitle, Locale::En) => "Shopping list",
            (Self::Loading, Locale::En) => "Loading...",
            (Self::Completed, Locale::En) => "Bought",
            (Self::Bought, Locale::En) => "bought",
            (Self::EmptyList, Locale::En) => "The list is empty. Add the first item!",
            (Self::Popular, Locale::En) => "Popular items",
            (Self::NoRecents, Locale::En) => "No saved lists",
            (Self::Offline, Locale::En) => "live sync stopped",
        }
    }
}

/// "Last visited" wording for the recents view.
pub fn format_last_visited(then: DateTime<Utc>, now: DateTime<Utc>, locale: Locale) -> String {
    let diff = now.signed_duration_since(then);
    let minutes = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();

    match locale {
        Locale::Uk => {
            if diff.num_seconds() < 60 {
                "щойно".to_string()
            } else if minutes < 60 {
                format!("{minutes} хв тому")
            } else if hours < 24 {
                format!("{hours} год тому")
            } else if days < 7 {
                format!("{days} дн тому")
            } else {
                then.with_timezone(&Local).format("%d.%m.%Y").to_string()
            }
        }
        Locale::En => {
            if diff.num_seconds() < 60 {
                "just now".to_string()
            } else if minutes < 60 {
                format!("{minutes} min ago")
            } else if hours < 24 {
                format!("{hours} h ago")
            } else if days < 7 {
                format!("{days} d ago")
            } else {
                then.with_timezone(&Local).format("%Y-%m-%d").to_string()
            }
        }
    }
}
