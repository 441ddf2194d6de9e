//! Optimistic mutations against the displayed list.
//!
//! Every intent is applied to the in-memory snapshot first and yields the
//! remote operation that mirrors it. Success leaves the optimistic state in
//! place; failure records a notice and asks for a full re-fetch, which then
//! replaces the guess wholesale. There is no rollback log.
//!
//! An added item carries a provisional id until a snapshot containing it
//! arrives. Intents aimed at it meanwhile are applied locally, queued, and
//! replayed against the server id once the snapshot lands.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::messages::Notice;
use crate::model::{Item, PendingEdit, ShoppingList, normalize_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    AddItem {
        list_id: String,
        name: String,
    },
    ToggleItem {
        list_id: String,
        item_id: String,
    },
    RenameItem {
        list_id: String,
        item_id: String,
        name: String,
    },
    DeleteItem {
        list_id: String,
        item_id: String,
    },
}

impl RemoteOp {
    pub fn list_id(&self) -> &str {
        match self {
            Self::AddItem { list_id, .. }
            | Self::ToggleItem { list_id, .. }
            | Self::RenameItem { list_id, .. }
            | Self::DeleteItem { list_id, .. } => list_id,
        }
    }

    pub fn failure_notice(&self) -> Notice {
        match self {
            Self::AddItem { .. } => Notice::AddFailed,
            Self::ToggleItem { .. } => Notice::ToggleFailed,
            Self::RenameItem { .. } => Notice::RenameFailed,
            Self::DeleteItem { .. } => Notice::DeleteFailed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AddItem { .. } => "add",
            Self::ToggleItem { .. } => "toggle",
            Self::RenameItem { .. } => "rename",
            Self::DeleteItem { .. } => "delete",
        }
    }
}

/// A remote operation produced by an optimistic change, tagged with the
/// authoritative version it was applied on top of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedOp {
    pub id: OpId,
    pub base_version: u64,
    pub op: RemoteOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Settled,
    Refetch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    Toggle,
    Rename(String),
    Delete,
}

/// An add whose item is not yet known under its server id.
#[derive(Debug)]
struct ProvisionalAdd {
    op: OpId,
    local_id: String,
    name: String,
    acknowledged: bool,
    deferred: Vec<Deferred>,
}

#[derive(Debug, Default)]
pub struct MutationPipeline {
    list: Option<ShoppingList>,
    version: u64,
    next_op: u64,
    in_flight: Vec<OpId>,
    pending_edit: Option<PendingEdit>,
    notice: Option<Notice>,
    /// Item ids of the last authoritative snapshot.
    known: HashSet<String>,
    provisional: Vec<ProvisionalAdd>,
    /// Provisional ids already matched, so late intents still find their item.
    resolved: HashMap<String, String>,
}

impl MutationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Option<&ShoppingList> {
        self.list.as_ref()
    }

    /// Bumped on every authoritative install; optimistic edits keep it.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_edit(&self) -> Option<&PendingEdit> {
        self.pending_edit.as_ref()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.notice
    }

    pub fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    pub fn is_empty(&self) -> bool {
        self.list.as_ref().is_none_or(ShoppingList::is_empty)
    }

    /// Adds whose server id is still unknown.
    pub fn unresolved(&self) -> usize {
        self.provisional.len()
    }

    /// Replaces local state with an authoritative snapshot, discarding any
    /// optimistic changes not yet reflected in it. Returns the intents that
    /// were waiting on an add this snapshot acknowledges, re-issued against
    /// their server ids.
    pub fn install(&mut self, mut list: ShoppingList) -> Vec<IssuedOp> {
        self.version += 1;
        if !self.in_flight.is_empty() {
            debug!(
                version = self.version,
                in_flight = self.in_flight.len(),
                "authoritative snapshot supersedes optimistic state"
            );
        }
        let replay = self.resolve_provisional(&mut list);
        if let Some(edit) = &self.pending_edit
            && !list.contains(&edit.item_id)
        {
            info!(item_id = %edit.item_id, "edited item vanished; dropping edit");
            self.pending_edit = None;
        }
        self.list = Some(list);
        replay.into_iter().map(|op| self.issue(op)).collect()
    }

    /// Matches outstanding adds to items that are new in `list`, by name and
    /// in submission order, and applies their queued intents to it.
    fn resolve_provisional(&mut self, list: &mut ShoppingList) -> Vec<RemoteOp> {
        let arrived = list.items.iter().map(|item| item.id.clone()).collect();
        let known = std::mem::replace(&mut self.known, arrived);
        let mut claimed = HashSet::new();
        let mut replay = Vec::new();

        for add in std::mem::take(&mut self.provisional) {
            let server_id = list
                .items
                .iter()
                .find(|item| {
                    item.name == add.name && !known.contains(&item.id) && !claimed.contains(&item.id)
                })
                .map(|item| item.id.clone());
            match server_id {
                Some(server_id) => {
                    debug!(
                        local_id = %add.local_id,
                        %server_id,
                        queued = add.deferred.len(),
                        "added item acknowledged by snapshot"
                    );
                    if let Some(edit) = self.pending_edit.as_mut()
                        && edit.item_id == add.local_id
                    {
                        edit.item_id.clone_from(&server_id);
                    }
                    replay.extend(
                        add.deferred
                            .into_iter()
                            .map(|intent| apply_deferred(list, &server_id, intent)),
                    );
                    self.resolved.insert(add.local_id, server_id.clone());
                    claimed.insert(server_id);
                }
                None if add.acknowledged => {
                    info!(
                        local_id = %add.local_id,
                        dropped = add.deferred.len(),
                        "acknowledged add missing from snapshot"
                    );
                }
                None => self.provisional.push(add),
            }
        }
        replay
    }

    pub fn add_item(&mut self, raw_name: &str) -> Option<IssuedOp> {
        let name = normalize_name(raw_name)?;
        let list = self.list.as_mut()?;
        let item = Item::provisional(name.clone());
        let local_id = item.id.clone();
        list.append(item);
        let list_id = list.id.clone();
        let issued = self.issue(RemoteOp::AddItem {
            list_id,
            name: name.clone(),
        });
        self.provisional.push(ProvisionalAdd {
            op: issued.id,
            local_id,
            name,
            acknowledged: false,
            deferred: Vec::new(),
        });
        Some(issued)
    }

    /// Flips an item. For a provisional item the flip is local and the remote
    /// toggle waits for the add to be acknowledged.
    pub fn toggle_item(&mut self, item_id: &str) -> Option<IssuedOp> {
        let item_id = self.canonical(item_id);
        let item_id = item_id.as_str();
        let list = self.list.as_mut()?;
        if !list.contains(item_id) {
            debug!(item_id, "toggle ignored; item not in list");
            return None;
        }
        if is_provisional(list, item_id) {
            if defer(&mut self.provisional, item_id, Deferred::Toggle) {
                list.toggle(item_id);
            }
            return None;
        }
        list.toggle(item_id);
        let list_id = list.id.clone();
        Some(self.issue(RemoteOp::ToggleItem {
            list_id,
            item_id: item_id.to_string(),
        }))
    }

    /// Removes the item locally. An id absent from the local snapshot is still
    /// sent; the server treats it as a no-op.
    pub fn delete_item(&mut self, item_id: &str) -> Option<IssuedOp> {
        let item_id = self.canonical(item_id);
        let item_id = item_id.as_str();
        let list = self.list.as_mut()?;
        let provisional = is_provisional(list, item_id);
        if provisional && !defer(&mut self.provisional, item_id, Deferred::Delete) {
            return None;
        }
        list.remove(item_id);
        if self
            .pending_edit
            .as_ref()
            .is_some_and(|edit| edit.item_id == item_id)
        {
            self.pending_edit = None;
        }
        if provisional {
            return None;
        }
        let list_id = list.id.clone();
        Some(self.issue(RemoteOp::DeleteItem {
            list_id,
            item_id: item_id.to_string(),
        }))
    }

    /// Starts renaming an item, replacing any edit already in progress.
    pub fn begin_edit(&mut self, item_id: &str) -> bool {
        let item_id = self.canonical(item_id);
        let Some(item) = self.list.as_ref().and_then(|list| list.item(&item_id)) else {
            return false;
        };
        self.pending_edit = Some(PendingEdit {
            item_id: item.id.clone(),
            draft_name: item.name.clone(),
        });
        true
    }

    pub fn edit_draft(&mut self, text: impl Into<String>) {
        if let Some(edit) = self.pending_edit.as_mut() {
            edit.draft_name = text.into();
        }
    }

    pub fn cancel_edit(&mut self) {
        self.pending_edit = None;
    }

    /// Saves the pending edit. A blank draft cancels instead.
    pub fn commit_edit(&mut self) -> Option<IssuedOp> {
        let edit = self.pending_edit.take()?;
        let name = normalize_name(&edit.draft_name)?;
        let list = self.list.as_mut()?;
        let provisional = is_provisional(list, &edit.item_id);
        if provisional
            && !defer(
                &mut self.provisional,
                &edit.item_id,
                Deferred::Rename(name.clone()),
            )
        {
            return None;
        }
        if !list.rename(&edit.item_id, &name) || provisional {
            return None;
        }
        let list_id = list.id.clone();
        Some(self.issue(RemoteOp::RenameItem {
            list_id,
            item_id: edit.item_id,
            name,
        }))
    }

    /// Settles a remote operation. Failures surface a notice and call for a
    /// re-fetch of authoritative state.
    pub fn complete(&mut self, issued: &IssuedOp, result: Result<(), RemoteError>) -> Completion {
        self.in_flight.retain(|id| *id != issued.id);
        if let Some(index) = self.provisional.iter().position(|add| add.op == issued.id) {
            if result.is_ok() {
                self.provisional[index].acknowledged = true;
            } else {
                let add = self.provisional.remove(index);
                if !add.deferred.is_empty() {
                    info!(local_id = %add.local_id, dropped = add.deferred.len(), "add failed; queued intents dropped");
                }
            }
        }
        match result {
            Ok(()) => {
                debug!(op = issued.op.label(), id = issued.id.0, "remote mutation acknowledged");
                Completion::Settled
            }
            Err(error) => {
                warn!(
                    op = issued.op.label(),
                    id = issued.id.0,
                    base_version = issued.base_version,
                    %error,
                    "remote mutation failed; re-fetching"
                );
                self.notice = Some(issued.op.failure_notice());
                Completion::Refetch
            }
        }
    }

    fn canonical(&self, item_id: &str) -> String {
        self.resolved
            .get(item_id)
            .map_or_else(|| item_id.to_string(), Clone::clone)
    }

    fn issue(&mut self, op: RemoteOp) -> IssuedOp {
        self.next_op += 1;
        let id = OpId(self.next_op);
        self.in_flight.push(id);
        self.notice = None;
        IssuedOp {
            id,
            base_version: self.version,
            op,
        }
    }
}

fn is_provisional(list: &ShoppingList, item_id: &str) -> bool {
    list.item(item_id).is_some_and(Item::is_provisional)
}

/// Queues `intent` behind the add that created `item_id`. False when that add
/// has already failed and the item is only waiting to be re-fetched away.
fn defer(adds: &mut [ProvisionalAdd], item_id: &str, intent: Deferred) -> bool {
    let Some(add) = adds.iter_mut().find(|add| add.local_id == item_id) else {
        debug!(item_id, "intent ignored; add for this item failed");
        return false;
    };
    debug!(item_id, ?intent, "intent queued until the add is acknowledged");
    add.deferred.push(intent);
    true
}

fn apply_deferred(list: &mut ShoppingList, item_id: &str, intent: Deferred) -> RemoteOp {
    let list_id = list.id.clone();
    let item_id = item_id.to_string();
    match intent {
        Deferred::Toggle => {
            list.toggle(&item_id);
            RemoteOp::ToggleItem { list_id, item_id }
        }
        Deferred::Rename(name) => {
            list.rename(&item_id, &name);
            RemoteOp::RenameItem {
                list_id,
                item_id,
                name,
            }
        }
        Deferred::Delete => {
            list.remove(&item_id);
            RemoteOp::DeleteItem { list_id, item_id }
        }
    }
}
