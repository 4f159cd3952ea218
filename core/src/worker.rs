//! A dedicated thread that owns a `SyncCoordinator` and runs its operations
//! one at a time.
//!
//! # Design
//! `SyncHandle` is cheap to clone and sends commands over a channel. A
//! mutation replies as soon as its local leg is done, so callers never wait
//! on the network; the remote leg runs on the worker before the next command
//! is taken, which keeps every operation, and every update to the same id,
//! in issue order.
//!
//! Replies go through a one-shot channel wrapped in `Pending`. Dropping a
//! `Pending` is how a caller abandons a result; the worker ignores the
//! failed send.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::store::ItemStore;
use crate::sync::{CacheStatus, Mutation, SyncCoordinator, SyncEvent, SyncStatus};
use crate::transport::Transport;
use crate::types::TodoItem;

enum Command {
    Load(Sender<Result<Vec<TodoItem>>>),
    Mutate(Mutation, Sender<Result<()>>),
    Sync(Sender<Result<()>>),
    Items(Sender<Result<Vec<TodoItem>>>),
    Status(Sender<Result<SyncStatus>>),
    Subscribe(Sender<Result<Receiver<SyncEvent>>>),
    Flush(Sender<Result<()>>),
    Shutdown,
}

/// A result the worker will deliver later.
#[must_use]
pub struct Pending<T> {
    rx: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    fn gone() -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(Err(SyncError::WorkerGone));
        Pending { rx }
    }

    /// Block until the worker replies.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().map_err(|_| SyncError::WorkerGone)?
    }
}

#[derive(Clone)]
pub struct SyncHandle {
    tx: Sender<Command>,
}

impl SyncHandle {
    fn request<R>(&self, make: impl FnOnce(Sender<Result<R>>) -> Command) -> Pending<R> {
        let (reply, rx) = bounded(1);
        if self.tx.send(make(reply)).is_err() {
            return Pending::gone();
        }
        Pending { rx }
    }

    /// Local cache first (then reconcile in the background), otherwise the
    /// server's list.
    pub fn load(&self) -> Pending<Vec<TodoItem>> {
        self.request(Command::Load)
    }

    pub fn add(&self, item: TodoItem) -> Pending<()> {
        self.mutate(Mutation::Add(item))
    }

    pub fn update(&self, item: TodoItem) -> Pending<()> {
        self.mutate(Mutation::Update(item))
    }

    pub fn delete(&self, id: &str) -> Pending<()> {
        self.mutate(Mutation::Delete(id.to_string()))
    }

    pub fn toggle_done(&self, id: &str) -> Pending<()> {
        self.mutate(Mutation::ToggleDone(id.to_string()))
    }

    pub fn mutate(&self, mutation: Mutation) -> Pending<()> {
        self.request(|reply| Command::Mutate(mutation, reply))
    }

    pub fn sync(&self) -> Pending<()> {
        self.request(Command::Sync)
    }

    pub fn items(&self) -> Pending<Vec<TodoItem>> {
        self.request(Command::Items)
    }

    pub fn status(&self) -> Pending<SyncStatus> {
        self.request(Command::Status)
    }

    pub fn subscribe(&self) -> Pending<Receiver<SyncEvent>> {
        self.request(Command::Subscribe)
    }

    /// Resolves once every command sent before it, network legs included,
    /// has finished.
    pub fn flush(&self) -> Pending<()> {
        self.request(Command::Flush)
    }
}

pub struct SyncWorker {
    handle: SyncHandle,
    thread: Option<JoinHandle<()>>,
}

impl SyncWorker {
    pub fn spawn<S, T>(coordinator: SyncCoordinator<S, T>) -> Result<Self>
    where
        S: ItemStore + 'static,
        T: Transport + 'static,
    {
        let (tx, rx) = unbounded();
        let thread = thread::Builder::new()
            .name("todo-sync".to_string())
            .spawn(move || run(coordinator, rx))
            .map_err(|_| SyncError::WorkerGone)?;
        Ok(Self {
            handle: SyncHandle { tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Finish queued commands, then stop the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.handle.tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<S: ItemStore, T: Transport>(mut coordinator: SyncCoordinator<S, T>, rx: Receiver<Command>) {
    info!("sync worker started");
    while let Ok(command) = rx.recv() {
        match command {
            Command::Load(reply) => match coordinator.load_local() {
                CacheStatus::Loaded => {
                    let _ = reply.send(Ok(coordinator.items()));
                    let _ = coordinator.sync();
                }
                status => {
                    let _ = reply.send(coordinator.load_from_server(status));
                }
            },
            Command::Mutate(mutation, reply) => match coordinator.apply_local(mutation) {
                Ok(pending) => {
                    let _ = reply.send(Ok(()));
                    let outcome = coordinator.push(pending);
                    debug!(?outcome, "remote leg finished");
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Sync(reply) => {
                let _ = reply.send(coordinator.sync());
            }
            Command::Items(reply) => {
                let _ = reply.send(Ok(coordinator.items()));
            }
            Command::Status(reply) => {
                let _ = reply.send(Ok(coordinator.status()));
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(Ok(coordinator.subscribe()));
            }
            Command::Flush(reply) => {
                let _ = reply.send(Ok(()));
            }
            Command::Shutdown => break,
        }
    }
    info!("sync worker stopped");
}
