//! End-to-end sync against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives a file-backed
//! coordinator built from `SyncConfig` over real HTTP. The server's state is
//! shared with the test so each step can check what actually landed there.

use std::net::SocketAddr;

use tempfile::TempDir;
use todo_sync_core::{
    Importance, RemoteClient, RemoteOutcome, SyncConfig, SyncError, SyncState, SyncWorker, TodoItem,
    UreqTransport,
};

const TOKEN: &str = "test-token";

fn start_server() -> (SocketAddr, mock_server::Db) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let db = mock_server::db(TOKEN);
    let server_db = db.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, server_db).await
        })
        .unwrap();
    });

    (addr, db)
}

fn config(addr: SocketAddr, dir: &TempDir) -> SyncConfig {
    SyncConfig {
        base_url: format!("http://{addr}"),
        token: TOKEN.to_string(),
        device_id: "laptop".to_string(),
        data_dir: dir.path().to_path_buf(),
        timeout_secs: 5,
        generate_fails: None,
    }
}

fn todo(id: impl Into<String>, text: impl Into<String>) -> TodoItem {
    TodoItem::with_id(id, text, Importance::Basic, None).unwrap()
}

fn server_ids(db: &mock_server::Db) -> Vec<String> {
    let mut ids: Vec<_> = db.blocking_read().items.iter().map(|i| i.id.clone()).collect();
    ids.sort();
    ids
}

#[test]
fn mutation_lifecycle() {
    let (addr, db) = start_server();
    let dir = TempDir::new().unwrap();
    let mut sync = config(addr, &dir).coordinator().unwrap();

    assert!(sync.load().unwrap().is_empty());
    assert_eq!(sync.revision(), 0);

    let milk = todo("1", "buy milk");
    let taxes = TodoItem::with_id("2", "file taxes", Importance::Important, None).unwrap();
    assert_eq!(sync.add(milk).unwrap(), RemoteOutcome::Synced);
    assert_eq!(sync.add(taxes).unwrap(), RemoteOutcome::Synced);
    assert_eq!(sync.revision(), 2);
    assert_eq!(server_ids(&db), ["1", "2"]);

    sync.toggle_done("1").unwrap();
    let done = sync.item("1").unwrap();
    assert!(done.is_done);
    let edited = done.edited("buy oat milk", Importance::Low, None).unwrap();
    sync.update(edited).unwrap();
    sync.delete("2").unwrap();

    assert_eq!(sync.revision(), 5);
    assert_eq!(sync.state(), SyncState::Clean);
    let backend = db.blocking_read();
    assert_eq!(backend.revision, 5);
    assert_eq!(backend.items.len(), 1);
    assert_eq!(backend.items[0].text, "buy oat milk");
    assert_eq!(backend.items[0].importance, "low");
    assert!(backend.items[0].done);
    assert_eq!(backend.items[0].last_updated_by, "laptop");
}

#[test]
fn single_item_fetch_matches_what_was_pushed() {
    let (addr, _db) = start_server();
    let dir = TempDir::new().unwrap();
    let config = config(addr, &dir);
    let mut sync = config.coordinator().unwrap();
    sync.load().unwrap();
    let item = TodoItem::with_id("g1", "water plants", Importance::Low, None).unwrap();
    sync.add(item.clone()).unwrap();

    let remote = RemoteClient::new(config.client(), UreqTransport::new(config.timeout()));
    let (fetched, revision) = remote.get_remote("g1", sync.revision()).unwrap();
    assert_eq!(fetched, item);
    assert_eq!(revision, 1);
    assert!(matches!(remote.get_remote("missing", revision), Err(SyncError::NotFound(_))));
}

#[test]
fn offline_changes_reconcile_after_restart() {
    let (addr, db) = start_server();
    let dir = TempDir::new().unwrap();

    {
        let offline = SyncConfig {
            generate_fails: Some(100),
            ..config(addr, &dir)
        };
        let mut sync = offline.coordinator().unwrap();
        let err = sync.load().unwrap_err();
        assert!(matches!(err, SyncError::LoadFailed(_)));

        let outcome = sync.add(todo("a", "written offline")).unwrap();
        assert_eq!(outcome, RemoteOutcome::Deferred);
        assert!(sync.is_dirty());
    }
    assert!(server_ids(&db).is_empty());

    let mut sync = config(addr, &dir).coordinator().unwrap();
    assert!(sync.is_dirty());
    let items = sync.load().unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(sync.state(), SyncState::Clean);
    assert_eq!(server_ids(&db), ["a"]);
    assert_eq!(sync.revision(), db.blocking_read().revision);
}

#[test]
fn concurrent_writer_forces_reconciliation() {
    let (addr, db) = start_server();
    let dir = TempDir::new().unwrap();
    let mut sync = config(addr, &dir).coordinator().unwrap();
    sync.load().unwrap();
    sync.add(todo("mine", "mine")).unwrap();

    {
        let mut backend = db.blocking_write();
        backend.items.push(mock_server::Item {
            id: "theirs".to_string(),
            text: "from another device".to_string(),
            importance: "basic".to_string(),
            deadline: None,
            done: false,
            created_at: 1_690_000_000,
            changed_at: 1_690_000_000,
            last_updated_by: "phone".to_string(),
        });
        backend.revision += 1;
    }

    let outcome = sync.add(todo("second", "second")).unwrap();
    assert_eq!(outcome, RemoteOutcome::Deferred);
    assert!(sync.is_dirty());

    sync.sync().unwrap();

    assert_eq!(sync.state(), SyncState::Clean);
    assert_eq!(server_ids(&db), ["mine", "second"]);
    assert_eq!(sync.revision(), db.blocking_read().revision);
}

#[test]
fn wrong_token_keeps_changes_local() {
    let (addr, db) = start_server();
    let dir = TempDir::new().unwrap();
    let bad = SyncConfig {
        token: "nope".to_string(),
        ..config(addr, &dir)
    };
    let mut sync = bad.coordinator().unwrap();

    match sync.load().unwrap_err() {
        SyncError::LoadFailed(cause) => assert!(matches!(*cause, SyncError::Unauthorized)),
        other => panic!("expected LoadFailed, got {other:?}"),
    }
    sync.add(todo("x", "kept")).unwrap();

    assert!(sync.is_dirty());
    assert_eq!(sync.items().len(), 1);
    assert!(server_ids(&db).is_empty());
}

#[test]
fn worker_over_http() {
    let (addr, db) = start_server();
    let dir = TempDir::new().unwrap();
    let worker = SyncWorker::spawn(config(addr, &dir).coordinator().unwrap()).unwrap();
    let handle = worker.handle();

    handle.load().wait().unwrap();
    for n in 0..5 {
        handle.add(todo(format!("w{n}"), format!("item {n}"))).wait().unwrap();
    }
    handle.delete("w0").wait().unwrap();
    handle.flush().wait().unwrap();

    let status = handle.status().wait().unwrap();
    assert_eq!(status.state, SyncState::Clean);
    assert_eq!(status.item_count, 4);
    assert_eq!(status.revision, 6);
    assert_eq!(server_ids(&db), ["w1", "w2", "w3", "w4"]);
    worker.shutdown();
}
