//! One displayed list: the event loop that owns every piece of client state.
//!
//! User commands, remote completions, push frames and timer deadlines are
//! all consumed by a single task, so nothing is shared and nothing is locked.
//! Remote calls run as spawned tasks that report back over a channel.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::debounce::QueryDebouncer;
use crate::error::RemoteError;
use crate::idle_hint::IdleHint;
use crate::messages::Notice;
use crate::model::{PendingEdit, ShoppingList};
use crate::pipeline::{Completion, IssuedOp, MutationPipeline};
use crate::push::{ChannelState, PushChannel, PushConnector, PushFrame, PushStream};
use crate::recents::RecentsCache;
use crate::remote::{ListApi, execute};
use crate::store::KeyValueStore;
use crate::timer::earliest;
use crate::view::ListView;

/// User intents accepted by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetInput(String),
    /// Adds whatever is currently typed in the input.
    AddItem,
    AddNamed(String),
    PickSuggestion(usize),
    PickHint(usize),
    Toggle(String),
    Delete(String),
    BeginEdit(String),
    EditDraft(String),
    CommitEdit,
    CancelEdit,
    /// The edit field lost focus; the edit is abandoned.
    FocusLost,
    Close,
}

/// Everything a front end needs to draw the list screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub list_id: String,
    pub loading: bool,
    pub not_found: bool,
    pub list: Option<ListView>,
    pub version: u64,
    pub input: String,
    pub suggestions: Vec<String>,
    pub editing: Option<PendingEdit>,
    pub hint_revealed: bool,
    pub hints: Vec<String>,
    pub error: Option<String>,
    pub channel: ChannelState,
}

#[derive(Debug)]
enum Event {
    Loaded(Result<ShoppingList, RemoteError>),
    Mutated {
        issued: IssuedOp,
        result: Result<(), RemoteError>,
    },
    Suggestions {
        generation: u64,
        result: Result<Vec<String>, RemoteError>,
    },
    Popular(Result<Vec<String>, RemoteError>),
    PushConnected(Result<PushStream, RemoteError>),
}

/// The caller's side of a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub fn send(&self, command: Command) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow::anyhow!("session has ended"))
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Waits for the next published view. `None` once the session is gone.
    pub async fn changed(&mut self) -> Option<SessionView> {
        self.view.changed().await.ok()?;
        Some(self.view.borrow_and_update().clone())
    }

    /// Waits until `predicate` holds for the published view.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<SessionView>
    where
        F: FnMut(&SessionView) -> bool,
    {
        self.view
            .wait_for(|view| predicate(view))
            .await
            .ok()
            .map(|view| view.clone())
    }

    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

pub struct Session<S> {
    list_id: String,
    settings: Settings,
    api: Arc<dyn ListApi>,
    push: Arc<dyn PushConnector>,
    recents: RecentsCache<S>,
    pipeline: MutationPipeline,
    debouncer: QueryDebouncer,
    idle_hint: IdleHint,
    channel: PushChannel,
    push_stream: Option<PushStream>,
    popular: Vec<String>,
    loading: bool,
    not_found: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
    view_tx: watch::Sender<SessionView>,
}

impl<S: KeyValueStore> Session<S> {
    pub fn new(
        list_id: impl Into<String>,
        settings: Settings,
        api: Arc<dyn ListApi>,
        push: Arc<dyn PushConnector>,
        recents: RecentsCache<S>,
    ) -> (Self, SessionHandle) {
        let list_id = list_id.into();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SessionView {
            list_id: list_id.clone(),
            loading: true,
            ..SessionView::default()
        });

        let session = Self {
            debouncer: QueryDebouncer::new(settings.debounce, settings.min_chars),
            idle_hint: IdleHint::new(settings.idle_hint),
            channel: PushChannel::new(list_id.clone()),
            list_id,
            settings,
            api,
            push,
            recents,
            pipeline: MutationPipeline::new(),
            push_stream: None,
            popular: Vec::new(),
            loading: true,
            not_found: false,
            commands,
            events_tx,
            events,
            view_tx,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            view: view_rx,
        };
        (session, handle)
    }

    /// Drives the session until it is closed or every handle is dropped.
    /// Hands the recents cache back for the next session.
    #[instrument(skip(self), fields(list_id = %self.list_id))]
    pub async fn run(mut self) -> RecentsCache<S> {
        info!("session started");
        self.spawn_fetch();
        self.spawn_push_connect();
        self.spawn_popular();

        loop {
            self.publish();
            let deadline = earliest([self.debouncer.deadline(), self.idle_hint.deadline()]);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Close) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.events.recv() => self.handle_event(event),
                frame = next_frame(&mut self.push_stream) => self.handle_frame(frame),
                () = sleep_until_deadline(deadline) => self.handle_timers(Instant::now()),
            }
        }

        self.teardown();
        self.publish();
        info!("session closed");
        self.recents
    }

    fn handle_command(&mut self, command: Command) {
        if self.not_found {
            debug!(?command, "list not found; command ignored");
            return;
        }
        let now = Instant::now();
        match command {
            Command::SetInput(text) => self.debouncer.on_input(text, now),
            Command::AddItem => {
                let name = self.debouncer.input().to_string();
                self.add(&name);
            }
            Command::AddNamed(name) => self.add(&name),
            Command::PickSuggestion(idx) => {
                if let Some(name) = self.debouncer.results().get(idx).cloned() {
                    self.add(&name);
                }
            }
            Command::PickHint(idx) => {
                if let Some(name) = self.visible_hints().get(idx).cloned() {
                    self.add(&name);
                }
            }
            Command::Toggle(item_id) => {
                if let Some(issued) = self.pipeline.toggle_item(&item_id) {
                    self.spawn_mutation(issued);
                }
            }
            Command::Delete(item_id) => {
                if let Some(issued) = self.pipeline.delete_item(&item_id) {
                    self.spawn_mutation(issued);
                }
            }
            Command::BeginEdit(item_id) => {
                self.pipeline.begin_edit(&item_id);
            }
            Command::EditDraft(text) => self.pipeline.edit_draft(text),
            Command::CommitEdit => {
                if let Some(issued) = self.pipeline.commit_edit() {
                    self.spawn_mutation(issued);
                }
            }
            Command::CancelEdit | Command::FocusLost => self.pipeline.cancel_edit(),
            Command::Close => {}
        }
        if self.pipeline.list().is_some() {
            self.idle_hint.observe(self.pipeline.is_empty(), now);
        }
    }

    fn add(&mut self, name: &str) {
        if let Some(issued) = self.pipeline.add_item(name) {
            self.debouncer.clear();
            self.spawn_mutation(issued);
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Loaded(Ok(list)) => {
                self.loading = false;
                self.install(list);
            }
            Event::Loaded(Err(error)) => {
                self.loading = false;
                if error.is_not_found() {
                    warn!(%error, "list does not exist");
                    self.not_found = true;
                    self.pipeline.set_notice(Notice::ListNotFound);
                    self.teardown();
                } else {
                    warn!(%error, "loading authoritative state failed");
                    self.pipeline.set_notice(Notice::LoadFailed);
                }
            }
            Event::Mutated { issued, result } => {
                // without an open channel no snapshot will follow on its own
                let completion = self.pipeline.complete(&issued, result);
                if completion == Completion::Refetch || self.channel.state() != &ChannelState::Open {
                    self.spawn_fetch();
                }
            }
            Event::Suggestions { generation, result } => {
                self.debouncer.on_result(generation, result);
            }
            Event::Popular(Ok(names)) => self.popular = names,
            Event::Popular(Err(error)) => {
                debug!(%error, "popular items unavailable");
                self.popular.clear();
            }
            Event::PushConnected(Ok(stream)) => {
                if self.channel.state().is_closed() {
                    debug!("push connected after teardown; dropping");
                } else {
                    self.push_stream = Some(stream);
                }
            }
            Event::PushConnected(Err(error)) => {
                self.channel.fail(Some(error.to_string()));
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<PushFrame>) {
        let frame = frame.unwrap_or(PushFrame::Closed(None));
        if let Some(list) = self.channel.on_frame(frame) {
            self.install(list);
        }
        if self.channel.state().is_closed() {
            self.push_stream = None;
        }
    }

    fn handle_timers(&mut self, now: Instant) {
        if let Some(request) = self.debouncer.poll(now) {
            let api = Arc::clone(&self.api);
            let tx = self.events_tx.clone();
            tokio::spawn(async move {
                let result = api.suggestions(&request.query).await;
                let _ = tx.send(Event::Suggestions {
                    generation: request.generation,
                    result,
                });
            });
        }
        if self.idle_hint.poll(now) {
            info!(popular = self.popular.len(), "showing popular items hint");
        }
    }

    /// Installs an authoritative snapshot and refreshes its recents entry.
    fn install(&mut self, list: ShoppingList) {
        if list.id != self.list_id {
            warn!(got = %list.id, "snapshot for a different list ignored");
            return;
        }
        self.recents.upsert(&list, Utc::now());
        let replayed = self.pipeline.install(list);
        debug!(
            version = self.pipeline.version(),
            replayed = replayed.len(),
            "authoritative state installed"
        );
        self.idle_hint.observe(self.pipeline.is_empty(), Instant::now());
        for issued in replayed {
            self.spawn_mutation(issued);
        }
    }

    fn teardown(&mut self) {
        self.debouncer.cancel();
        self.idle_hint.teardown();
        self.channel.close();
        self.push_stream = None;
    }

    fn visible_hints(&self) -> Vec<String> {
        if !self.idle_hint.is_revealed() {
            return Vec::new();
        }
        self.popular
            .iter()
            .take(self.settings.popular_shown)
            .cloned()
            .collect()
    }

    fn publish(&self) {
        let locale = self.settings.locale;
        let view = SessionView {
            list_id: self.list_id.clone(),
            loading: self.loading,
            not_found: self.not_found,
            list: self.pipeline.list().map(ListView::derive),
            version: self.pipeline.version(),
            input: self.debouncer.input().to_string(),
            suggestions: self.debouncer.results().to_vec(),
            editing: self.pipeline.pending_edit().cloned(),
            hint_revealed: self.idle_hint.is_revealed(),
            hints: self.visible_hints(),
            error: self.pipeline.notice().map(|notice| notice.text(locale).to_string()),
            channel: self.channel.state().clone(),
        };
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    fn spawn_fetch(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        let list_id = self.list_id.clone();
        tokio::spawn(async move {
            let result = api.fetch_list(&list_id).await;
            let _ = tx.send(Event::Loaded(result));
        });
    }

    fn spawn_mutation(&self, issued: IssuedOp) {
        debug!(
            op = issued.op.label(),
            id = issued.id.0,
            list_id = issued.op.list_id(),
            "optimistic change applied"
        );
        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = execute(api.as_ref(), &issued.op).await;
            let _ = tx.send(Event::Mutated { issued, result });
        });
    }

    fn spawn_push_connect(&self) {
        let push = Arc::clone(&self.push);
        let tx = self.events_tx.clone();
        let list_id = self.list_id.clone();
        tokio::spawn(async move {
            let result = push.connect(&list_id).await;
            let _ = tx.send(Event::PushConnected(result));
        });
    }

    fn spawn_popular(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        let limit = self.settings.popular_limit;
        tokio::spawn(async move {
            let result = api.popular(limit).await;
            let _ = tx.send(Event::Popular(result));
        });
    }
}

async fn next_frame(stream: &mut Option<PushStream>) -> Option<PushFrame> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Creates a list on the server. Blank names are rejected locally.
#[instrument(skip(api))]
pub async fn create_list(api: &dyn ListApi, name: &str) -> Result<Option<ShoppingList>, RemoteError> {
    let Some(name) = crate::model::normalize_name(name) else {
        debug!("blank list name; nothing created");
        return Ok(None);
    };
    let list = api.create_list(&name).await?;
    info!(list_id = %list.id, "list created");
    Ok(Some(list))
}
