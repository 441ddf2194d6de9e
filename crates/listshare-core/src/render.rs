use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Settings;
use crate::messages::{Label, Locale, format_last_visited};
use crate::recents::RecentListEntry;
use crate::session::SessionView;
use crate::view::ListView;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    locale: Locale,
}

impl Renderer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            color: settings.color && io::stdout().is_terminal(),
            locale: settings.locale,
        }
    }

    pub fn plain(locale: Locale) -> Self {
        Self {
            color: false,
            locale,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Items are numbered in display order; the interactive commands refer
    /// to them by these numbers.
    #[tracing::instrument(skip(self, out, list))]
    pub fn write_list<W: Write>(&self, out: &mut W, list: &ListView) -> anyhow::Result<()> {
        let title = if list.name.trim().is_empty() {
            Label::DefaultTitle.text(self.locale)
        } else {
            list.name.as_str()
        };
        writeln!(
            out,
            "{}  {}/{} {} ({}%)",
            self.paint(title, "1"),
            list.completed_count(),
            list.total,
            Label::Bought.text(self.locale),
            list.progress
        )?;

        if list.is_empty() {
            writeln!(out, "  {}", Label::EmptyList.text(self.locale))?;
            return Ok(());
        }

        for (idx, item) in list.pending.iter().enumerate() {
            let marker = if item.is_provisional() { " *" } else { "" };
            writeln!(out, "{:>3}. [ ] {}{}", idx + 1, item.name, marker)?;
        }
        if !list.completed.is_empty() {
            writeln!(out, "  {}:", Label::Completed.text(self.locale))?;
            let offset = list.pending.len();
            for (idx, item) in list.completed.iter().enumerate() {
                let line = format!("{:>3}. [x] {}", offset + idx + 1, item.name);
                writeln!(out, "{}", self.paint(&line, "2"))?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out, view))]
    pub fn write_session<W: Write>(&self, out: &mut W, view: &SessionView) -> anyhow::Result<()> {
        if let Some(error) = &view.error {
            writeln!(out, "{}", self.paint(error, "31"))?;
        }
        if view.not_found {
            return Ok(());
        }

        match &view.list {
            Some(list) => self.write_list(out, list)?,
            None if view.loading => writeln!(out, "{}", Label::Loading.text(self.locale))?,
            None => {}
        }

        if let Some(edit) = &view.editing {
            let position = view.list.as_ref().and_then(|list| {
                list.display_order()
                    .position(|item| item.id == edit.item_id)
            });
            match position {
                Some(idx) => writeln!(out, "  ~ {}: {}", idx + 1, edit.draft_name)?,
                None => writeln!(out, "  ~ {}", edit.draft_name)?,
            }
        }

        if !view.input.is_empty() {
            writeln!(out, "> {}", view.input)?;
            for (idx, name) in view.suggestions.iter().enumerate() {
                writeln!(out, "  ? {}. {}", idx + 1, name)?;
            }
        }

        if view.hint_revealed && !view.hints.is_empty() {
            writeln!(out, "{}:", self.paint(Label::Popular.text(self.locale), "36"))?;
            for (idx, name) in view.hints.iter().enumerate() {
                writeln!(out, "  + {}. {}", idx + 1, name)?;
            }
        }

        if view.channel.is_closed() && !view.loading {
            writeln!(out, "({})", self.paint(Label::Offline.text(self.locale), "33"))?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out, entries, now))]
    pub fn write_recents<W: Write>(
        &self,
        out: &mut W,
        entries: &[RecentListEntry],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if entries.is_empty() {
            writeln!(out, "{}", Label::NoRecents.text(self.locale))?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Items".to_string(),
            "Preview".to_string(),
            "Visited".to_string(),
        ];

        let rows = entries
            .iter()
            .map(|entry| {
                let name = if entry.name.trim().is_empty() {
                    Label::DefaultTitle.text(self.locale).to_string()
                } else {
                    entry.name.clone()
                };
                vec![
                    self.paint(&entry.id, "33"),
                    name,
                    entry.item_count.to_string(),
                    entry.preview_names.join(", "),
                    format_last_visited(entry.last_visited_at, now, self.locale),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    pub fn write_popular<W: Write>(&self, out: &mut W, names: &[String]) -> anyhow::Result<()> {
        writeln!(out, "{}:", self.paint(Label::Popular.text(self.locale), "36"))?;
        for (idx, name) in names.iter().enumerate() {
            writeln!(out, "{:>3}. {}", idx + 1, name)?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    writer: &mut W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
