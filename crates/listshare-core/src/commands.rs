use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Settings;
use crate::error::RemoteError;
use crate::messages::{Locale, Notice};
use crate::push::{PushConnector, WsConnector};
use crate::recents::RecentsCache;
use crate::remote::{HttpListApi, ListApi, share_link};
use crate::render::Renderer;
use crate::session::{Command, Session, SessionView, create_list};
use crate::store::KeyValueStore;
use crate::view::ListView;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "create", "open", "show", "link", "recents", "forget", "popular", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, settings, renderer, inv))]
pub fn dispatch<S>(
    store: S,
    settings: &Settings,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()>
where
    S: KeyValueStore + Send + 'static,
{
    debug!(command = %inv.command, args = ?inv.args, "dispatching command");

    let mut recents = RecentsCache::load(store, settings.recents_capacity, settings.recents_preview);
    let api: Arc<dyn ListApi> = Arc::new(HttpListApi::new(settings.api_base.clone()));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match inv.command.as_str() {
        "create" => runtime.block_on(cmd_create(api.as_ref(), settings, &mut recents, renderer, &inv.args)),
        "open" => runtime.block_on(cmd_open(api, settings, recents, renderer, &inv.args)),
        "show" => runtime.block_on(cmd_show(api.as_ref(), &mut recents, renderer, &inv.args)),
        "link" => cmd_link(settings, &inv.args),
        "recents" => cmd_recents(&recents, renderer),
        "forget" => cmd_forget(&mut recents, &inv.args),
        "popular" => runtime.block_on(cmd_popular(api.as_ref(), settings, renderer)),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn remote_failure(error: RemoteError, notice: Notice, locale: Locale) -> anyhow::Error {
    if error.is_not_found() {
        return anyhow!(Notice::ListNotFound.text(locale));
    }
    anyhow::Error::new(error).context(notice.text(locale))
}

fn single_arg<'a>(args: &'a [String], command: &str) -> anyhow::Result<&'a str> {
    match args {
        [one] => Ok(one.as_str()),
        _ => bail!("usage: listshare {command} <list-id>"),
    }
}

#[instrument(skip(api, settings, recents, renderer, args))]
async fn cmd_create<S: KeyValueStore>(
    api: &dyn ListApi,
    settings: &Settings,
    recents: &mut RecentsCache<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command create");

    let name = args.join(" ");
    let created = create_list(api, &name)
        .await
        .map_err(|err| remote_failure(err, Notice::CreateFailed, renderer.locale()))?;
    let Some(list) = created else {
        warn!("list name is blank; nothing created");
        return Ok(());
    };

    recents.upsert(&list, Utc::now());
    println!("{}", list.id);
    println!("{}", share_link(&settings.api_base, &list.id)?);
    Ok(())
}

fn cmd_link(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let list_id = single_arg(args, "link")?;
    println!("{}", share_link(&settings.api_base, list_id)?);
    Ok(())
}

#[instrument(skip(api, recents, renderer, args))]
async fn cmd_show<S: KeyValueStore>(
    api: &dyn ListApi,
    recents: &mut RecentsCache<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let list_id = single_arg(args, "show")?;
    info!(list_id, "command show");

    let list = api
        .fetch_list(list_id)
        .await
        .map_err(|err| remote_failure(err, Notice::LoadFailed, renderer.locale()))?;
    recents.upsert(&list, Utc::now());

    let mut out = io::stdout().lock();
    renderer.write_list(&mut out, &ListView::derive(&list))
}

fn cmd_recents<S: KeyValueStore>(recents: &RecentsCache<S>, renderer: &Renderer) -> anyhow::Result<()> {
    info!(
        count = recents.len(),
        capacity = recents.capacity(),
        "command recents"
    );
    let mut out = io::stdout().lock();
    renderer.write_recents(&mut out, recents.list(), Utc::now())
}

fn cmd_forget<S: KeyValueStore>(recents: &mut RecentsCache<S>, args: &[String]) -> anyhow::Result<()> {
    let list_id = single_arg(args, "forget")?;
    if recents.remove(list_id) {
        println!("Forgot list {list_id}.");
    } else {
        println!("No saved list {list_id}.");
    }
    Ok(())
}

#[instrument(skip(api, settings, renderer))]
async fn cmd_popular(api: &dyn ListApi, settings: &Settings, renderer: &Renderer) -> anyhow::Result<()> {
    let names = api
        .popular(settings.popular_limit)
        .await
        .context("failed to fetch popular items")?;
    let mut out = io::stdout().lock();
    renderer.write_popular(&mut out, &names)
}

#[instrument(skip(api, settings, recents, renderer, args))]
async fn cmd_open<S>(
    api: Arc<dyn ListApi>,
    settings: &Settings,
    recents: RecentsCache<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()>
where
    S: KeyValueStore + Send + 'static,
{
    let list_id = single_arg(args, "open")?;
    info!(list_id, "command open");

    let push: Arc<dyn PushConnector> = Arc::new(WsConnector::new(&settings.api_base));
    let (session, mut handle) = Session::new(list_id, settings.clone(), api, push, recents);
    let task = tokio::spawn(session.run());

    print_view(renderer, &handle.view())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed reading stdin")? else {
                    break;
                };
                let commands = match parse_line(&line, &handle.view()) {
                    Ok(commands) => commands,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                };
                let quit = commands.contains(&Command::Close);
                for command in commands {
                    handle.send(command)?;
                }
                if quit {
                    break;
                }
            }
            view = handle.changed() => {
                let Some(view) = view else {
                    break;
                };
                print_view(renderer, &view)?;
            }
        }
    }

    handle.close();
    let recents = task.await.context("session task failed")?;
    debug!(saved = recents.len(), "session finished");
    Ok(())
}

fn print_view(renderer: &Renderer, view: &SessionView) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out)?;
    renderer.write_session(&mut out, view)?;
    out.flush()?;
    Ok(())
}

/// Turns one line of interactive input into session commands. Item and
/// suggestion numbers are 1-based, as rendered.
pub fn parse_line(line: &str, view: &SessionView) -> anyhow::Result<Vec<Command>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }
    let (verb, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));

    let command = match verb {
        "add" if rest.trim().is_empty() => Command::AddItem,
        "add" => Command::AddNamed(rest.to_string()),
        "type" => Command::SetInput(rest.to_string()),
        "pick" => Command::PickSuggestion(parse_number(rest)?),
        "hint" => Command::PickHint(parse_number(rest)?),
        "toggle" => Command::Toggle(item_at(view, rest)?),
        "delete" => Command::Delete(item_at(view, rest)?),
        "rename" => {
            let (number, name) = rest.trim_start().split_once(' ').unwrap_or((rest, ""));
            return Ok(vec![
                Command::BeginEdit(item_at(view, number)?),
                Command::EditDraft(name.to_string()),
                Command::CommitEdit,
            ]);
        }
        "quit" | "q" | "exit" => Command::Close,
        other => bail!("unknown input command: {other}"),
    };
    Ok(vec![command])
}

fn parse_number(raw: &str) -> anyhow::Result<usize> {
    let number: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("expected a number, got {raw:?}"))?;
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow!("numbers start at 1"))
}

fn item_at(view: &SessionView, raw: &str) -> anyhow::Result<String> {
    let idx = parse_number(raw)?;
    view.list
        .as_ref()
        .and_then(|list| list.display_order().nth(idx))
        .map(|item| item.id.clone())
        .ok_or_else(|| anyhow!("no item number {}", idx + 1))
}

fn cmd_help() -> anyhow::Result<()> {
    println!("listshare: shared shopping lists");
    println!();
    println!("commands:");
    println!("  create <name...>   create a list and print its id and link");
    println!("  open <id>          open a list and edit it from stdin");
    println!("  show <id>          print a list once");
    println!("  link <id>          print the address to share a list");
    println!("  recents            lists visited on this machine");
    println!("  forget <id>        remove a list from the recents");
    println!("  popular            popular item names");
    println!();
    println!("inside open:");
    println!("  add <name> | type <text> | pick <n> | hint <n>");
    println!("  toggle <n> | rename <n> <name> | delete <n> | quit");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Item, ShoppingList};

    fn view() -> SessionView {
        let mut list = ShoppingList::new("l1", "Groceries");
        list.items = vec![
            Item {
                id: "milk-id".into(),
                name: "milk".into(),
                completed: true,
            },
            Item {
                id: "bread-id".into(),
                name: "bread".into(),
                completed: false,
            },
        ];
        SessionView {
            list_id: "l1".into(),
            list: Some(ListView::derive(&list)),
            ..SessionView::default()
        }
    }

    #[test]
    fn item_numbers_follow_display_order() {
        let view = view();
        assert_eq!(
            parse_line("toggle 1", &view).unwrap(),
            vec![Command::Toggle("bread-id".into())]
        );
        assert_eq!(
            parse_line("delete 2", &view).unwrap(),
            vec![Command::Delete("milk-id".into())]
        );
        assert!(parse_line("toggle 3", &view).is_err());
        assert!(parse_line("toggle 0", &view).is_err());
    }

    #[test]
    fn rename_expands_to_an_edit_sequence() {
        assert_eq!(
            parse_line("rename 2 oat milk", &view()).unwrap(),
            vec![
                Command::BeginEdit("milk-id".into()),
                Command::EditDraft("oat milk".into()),
                Command::CommitEdit,
            ]
        );
    }

    #[test]
    fn text_commands_keep_their_argument() {
        let view = view();
        assert_eq!(
            parse_line("type mi", &view).unwrap(),
            vec![Command::SetInput("mi".into())]
        );
        assert_eq!(
            parse_line("add  eggs", &view).unwrap(),
            vec![Command::AddNamed(" eggs".into())]
        );
        assert_eq!(parse_line("add", &view).unwrap(), vec![Command::AddItem]);
        assert_eq!(
            parse_line("pick 1", &view).unwrap(),
            vec![Command::PickSuggestion(0)]
        );
        assert_eq!(parse_line("quit", &view).unwrap(), vec![Command::Close]);
        assert!(parse_line("   ", &view).unwrap().is_empty());
        assert!(parse_line("dance", &view).is_err());
    }

    #[test]
    fn command_prefixes_resolve_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("sh", &known), Some("show"));
        assert_eq!(expand_command_abbrev("op", &known), Some("open"));
        assert_eq!(expand_command_abbrev("p", &known), Some("popular"));
        assert_eq!(expand_command_abbrev("o", &known), Some("open"));
        assert_eq!(expand_command_abbrev("re", &known), Some("recents"));
        assert_eq!(expand_command_abbrev("l", &known), Some("link"));
        assert_eq!(expand_command_abbrev("x", &known), None);
    }
}
