//! The sync coordinator: local-first mutations with best-effort push to the
//! server, and whole-list reconciliation once local and remote diverge.
//!
//! # Design
//! Every mutation runs in two legs. The local leg applies the change to the
//! item store and is the only part whose failure reaches the caller. The
//! remote leg then either sends the matching incremental request (Clean) or
//! a full `PATCH /list` (Dirty). A failed remote leg never reverts the local
//! change; it marks the coordinator Dirty so the next mutation, or an
//! explicit `sync`, reconciles.
//!
//! Reconciliation is server-wins: whatever list the server returns replaces
//! the local store wholesale.
//!
//! The coordinator takes `&mut self` for every operation that touches the
//! revision or the dirty flag. Callers share it through `SyncWorker` (one
//! thread, one queue) or their own mutex.

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{error, info, warn};

use crate::error::{Result, SyncError};
use crate::remote::RemoteClient;
use crate::store::{ItemStore, PersistedSyncState};
use crate::transport::Transport;
use crate::types::{sort_by_recency, TodoItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Clean,
    Dirty,
}

/// Notifications for whoever renders the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ItemsChanged,
    StateChanged(SyncState),
    RevisionAdvanced(i64),
    SyncFailed(String),
}

/// What happened on the remote leg of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The incremental request succeeded.
    Synced,
    /// The coordinator was Dirty and a full reconciliation succeeded.
    Reconciled,
    /// The remote leg failed; the change is local only and the coordinator
    /// is Dirty.
    Deferred,
}

/// A local change, as requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Add(TodoItem),
    Update(TodoItem),
    Delete(String),
    ToggleDone(String),
}

/// The remote leg still owed for a mutation whose local leg succeeded.
#[must_use = "a pending push must be handed to `push`"]
#[derive(Debug)]
pub struct PendingPush(Push);

#[derive(Debug)]
enum Push {
    Create(TodoItem),
    Update(TodoItem),
    Delete(String),
}

/// Result of reading the local cache.
#[derive(Debug)]
pub enum CacheStatus {
    Loaded,
    Missing,
    Unreadable(SyncError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub revision: i64,
    pub item_count: usize,
}

/// Last known server revision, with protection against a response that
/// completes after a later one has already been applied.
///
/// Each request takes a ticket before it goes out; a revision is accepted
/// only if its ticket is at least as new as the last accepted one.
#[derive(Debug, Clone)]
pub struct RevisionTracker {
    value: i64,
    issued: u64,
    applied: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl RevisionTracker {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            issued: 0,
            applied: 0,
        }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn ticket(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    /// Store `revision` unless a newer ticket already did. Returns whether
    /// the value was taken.
    pub fn observe(&mut self, ticket: Ticket, revision: i64) -> bool {
        if ticket.0 < self.applied {
            return false;
        }
        self.applied = ticket.0;
        self.value = revision;
        true
    }
}

pub struct SyncCoordinator<S, T> {
    store: S,
    remote: RemoteClient<T>,
    revision: RevisionTracker,
    state: SyncState,
    subscribers: Vec<Sender<SyncEvent>>,
}

impl<S: ItemStore, T: Transport> SyncCoordinator<S, T> {
    /// Build a coordinator, restoring the persisted revision and dirty flag.
    /// Items are not read until `load`.
    pub fn new(store: S, remote: RemoteClient<T>) -> Result<Self> {
        let persisted = store.load_sync_state()?;
        let state = if persisted.dirty {
            SyncState::Dirty
        } else {
            SyncState::Clean
        };
        info!(revision = persisted.revision, ?state, "sync coordinator ready");
        Ok(Self {
            store,
            remote,
            revision: RevisionTracker::new(persisted.revision),
            state,
            subscribers: Vec::new(),
        })
    }

    pub fn subscribe(&mut self) -> Receiver<SyncEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state == SyncState::Dirty
    }

    pub fn revision(&self) -> i64 {
        self.revision.value()
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            state: self.state,
            revision: self.revision(),
            item_count: self.store.list().len(),
        }
    }

    /// All items, most recently touched first.
    pub fn items(&self) -> Vec<TodoItem> {
        let mut items = self.store.list();
        sort_by_recency(&mut items);
        items
    }

    pub fn item(&self, id: &str) -> Option<TodoItem> {
        self.store.get(id)
    }

    /// Load for display: the local cache if there is one (then reconcile),
    /// otherwise the server's list.
    pub fn load(&mut self) -> Result<Vec<TodoItem>> {
        match self.load_local() {
            CacheStatus::Loaded => {
                // A failed reconcile leaves the coordinator Dirty; the cached
                // items are still what the caller should see.
                let _ = self.sync();
                Ok(self.items())
            }
            status => self.load_from_server(status),
        }
    }

    /// First half of `load`: read the durable cache into the store.
    pub fn load_local(&mut self) -> CacheStatus {
        match self.store.load() {
            Ok(true) => {
                self.emit(SyncEvent::ItemsChanged);
                CacheStatus::Loaded
            }
            Ok(false) => CacheStatus::Missing,
            Err(e) => {
                error!(error = %e, "local cache unreadable; falling back to server");
                CacheStatus::Unreadable(e)
            }
        }
    }

    /// Second half of `load` when there is no usable cache: populate the
    /// store from `GET /list`. If that fails there is nothing to show, and
    /// the error reported is the cache problem when there was one.
    pub fn load_from_server(&mut self, cache: CacheStatus) -> Result<Vec<TodoItem>> {
        let ticket = self.revision.ticket();
        let fetched = self
            .remote
            .list_remote(self.revision.value())
            .and_then(|(items, revision)| {
                self.store.replace_all(items)?;
                Ok(revision)
            });
        match fetched {
            Ok(revision) => {
                self.observe_revision(ticket, revision);
                self.set_state(SyncState::Clean);
                self.emit(SyncEvent::ItemsChanged);
                Ok(self.items())
            }
            Err(remote_err) => {
                warn!(error = %remote_err, "initial fetch failed");
                self.emit(SyncEvent::SyncFailed(remote_err.to_string()));
                let cause = match cache {
                    CacheStatus::Unreadable(cache_err) => cache_err,
                    _ => remote_err,
                };
                Err(SyncError::LoadFailed(Box::new(cause)))
            }
        }
    }

    pub fn add(&mut self, item: TodoItem) -> Result<RemoteOutcome> {
        self.mutate(Mutation::Add(item))
    }

    pub fn update(&mut self, item: TodoItem) -> Result<RemoteOutcome> {
        self.mutate(Mutation::Update(item))
    }

    pub fn delete(&mut self, id: &str) -> Result<RemoteOutcome> {
        self.mutate(Mutation::Delete(id.to_string()))
    }

    pub fn toggle_done(&mut self, id: &str) -> Result<RemoteOutcome> {
        self.mutate(Mutation::ToggleDone(id.to_string()))
    }

    /// Apply both legs. Only a local failure is returned as `Err`.
    pub fn mutate(&mut self, mutation: Mutation) -> Result<RemoteOutcome> {
        let pending = self.apply_local(mutation)?;
        Ok(self.push(pending))
    }

    /// Local leg. Nothing is sent if this fails.
    pub fn apply_local(&mut self, mutation: Mutation) -> Result<PendingPush> {
        let push = match mutation {
            Mutation::Add(item) => {
                item.validate()?;
                self.store.add(item.clone())?;
                Push::Create(item)
            }
            Mutation::Update(item) => {
                item.validate()?;
                self.store.replace(item.clone())?;
                Push::Update(item)
            }
            Mutation::Delete(id) => {
                let removed = self.store.remove(&id)?;
                Push::Delete(removed.id)
            }
            Mutation::ToggleDone(id) => {
                let current = self
                    .store
                    .get(&id)
                    .ok_or_else(|| SyncError::NotFound(id.clone()))?;
                let toggled = current.toggled_done();
                self.store.replace(toggled.clone())?;
                Push::Update(toggled)
            }
        };
        self.emit(SyncEvent::ItemsChanged);
        Ok(PendingPush(push))
    }

    /// Remote leg. Failures are absorbed into the Dirty state.
    pub fn push(&mut self, pending: PendingPush) -> RemoteOutcome {
        if self.is_dirty() {
            return match self.sync() {
                Ok(()) => RemoteOutcome::Reconciled,
                Err(_) => RemoteOutcome::Deferred,
            };
        }

        let ticket = self.revision.ticket();
        let known = self.revision.value();
        let result = match &pending.0 {
            Push::Create(item) => self.remote.create_remote(item, known),
            Push::Update(item) => self.remote.update_remote(item, known),
            Push::Delete(id) => self.remote.delete_remote(id, known),
        };
        match result {
            Ok((_, revision)) => {
                self.observe_revision(ticket, revision);
                RemoteOutcome::Synced
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), op = ?pending.0, "push failed; local change kept");
                self.emit(SyncEvent::SyncFailed(e.to_string()));
                self.set_state(SyncState::Dirty);
                RemoteOutcome::Deferred
            }
        }
    }

    /// Reconcile now: send the whole local list and adopt the server's reply.
    ///
    /// A 400 usually means our revision is stale; in that case the current
    /// revision is fetched and the exchange retried once.
    pub fn sync(&mut self) -> Result<()> {
        let result = match self.replace_all() {
            Err(SyncError::BadRequest) => self.refresh_revision().and_then(|()| self.replace_all()),
            other => other,
        };
        match result {
            Ok(()) => {
                self.set_state(SyncState::Clean);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "reconciliation failed");
                self.emit(SyncEvent::SyncFailed(e.to_string()));
                self.set_state(SyncState::Dirty);
                Err(e)
            }
        }
    }

    fn replace_all(&mut self) -> Result<()> {
        let ticket = self.revision.ticket();
        let local = self.store.list();
        let (server_items, revision) = self.remote.replace_all_remote(&local, self.revision.value())?;
        if server_items != local {
            self.store.replace_all(server_items)?;
            self.emit(SyncEvent::ItemsChanged);
        }
        self.observe_revision(ticket, revision);
        Ok(())
    }

    fn refresh_revision(&mut self) -> Result<()> {
        let ticket = self.revision.ticket();
        let (_, revision) = self.remote.list_remote(self.revision.value())?;
        self.observe_revision(ticket, revision);
        Ok(())
    }

    fn observe_revision(&mut self, ticket: Ticket, revision: i64) {
        let before = self.revision.value();
        if !self.revision.observe(ticket, revision) {
            warn!(revision, current = before, "discarding revision from a superseded response");
            return;
        }
        if revision != before {
            self.emit(SyncEvent::RevisionAdvanced(revision));
            self.persist_sync_state();
        }
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state == state {
            return;
        }
        info!(from = ?self.state, to = ?state, revision = self.revision(), "sync state changed");
        self.state = state;
        self.emit(SyncEvent::StateChanged(state));
        self.persist_sync_state();
    }

    fn persist_sync_state(&mut self) {
        let persisted = PersistedSyncState {
            revision: self.revision.value(),
            dirty: self.is_dirty(),
        };
        if let Err(e) = self.store.save_sync_state(persisted) {
            error!(error = %e, "could not persist sync state");
        }
    }

    fn emit(&mut self, event: SyncEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
