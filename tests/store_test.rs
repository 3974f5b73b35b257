use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use orchestra::{
    AgentRole, Escalation, Loaded, OrchestraConfig, Snapshot, StateStore, StoreError, Task,
    TaskCounts, TaskStatus,
};
use tempfile::TempDir;

fn present(store: &StateStore) -> orchestra::OrchestraState {
    match store.load().unwrap() {
        Loaded::Present(state) => state,
        Loaded::Absent => panic!("expected committed state"),
    }
}

// ============================================================================
// Ordering and uniqueness
// ============================================================================

#[test]
fn tasks_load_in_append_order() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());

    let ids = ["b", "a", "T10", "T2", "zeta"];
    for id in ids {
        store.append_task(Task::new(id, "work")).unwrap();
    }

    let loaded: Vec<_> = present(&store).tasks.into_iter().map(|t| t.id).collect();
    assert_eq!(loaded, ids);
}

#[test]
fn duplicate_id_fails_without_mutation() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    store
        .append_task(Task::new("T1", "original").assigned_to(AgentRole::Researcher))
        .unwrap();
    let before = present(&store);

    let err = store
        .append_task(Task::new("T1", "impostor").assigned_to(AgentRole::EngineerB))
        .unwrap_err();

    assert!(matches!(err, StoreError::DuplicateIdentifier { .. }));
    assert_eq!(present(&store), before);
}

#[test]
fn done_is_terminal() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    store.append_task(Task::new("T1", "trivial")).unwrap();

    store.update_task_status("T1", TaskStatus::Done).unwrap();

    for status in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Done] {
        let err = store.update_task_status("T1", status).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }
    assert_eq!(present(&store).tasks[0].status, TaskStatus::Done);
}

// ============================================================================
// Concurrency and crash safety
// ============================================================================

#[test]
fn concurrent_writers_lose_no_updates() {
    let dir = TempDir::new().unwrap();
    let config = OrchestraConfig {
        lock_timeout_ms: 10_000,
        lock_poll_ms: 2,
        ..OrchestraConfig::default()
    };
    let writers = 12;
    let barrier = Arc::new(Barrier::new(writers));

    let handles: Vec<_> = (0..writers)
        .map(|i| {
            // Each writer opens its own handle, as separate processes would
            let store = StateStore::open(dir.path(), &config);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.append_task(Task::new(&format!("T{}", i), "parallel"))
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let store = StateStore::open(dir.path(), &config);
    let mut ids: Vec<_> = present(&store).tasks.into_iter().map(|t| t.id).collect();
    ids.sort();
    let mut expected: Vec<_> = (0..writers).map(|i| format!("T{}", i)).collect();
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn interrupted_write_is_invisible() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    store.append_task(Task::new("T1", "committed")).unwrap();
    let committed = present(&store);

    // A writer killed after writing part of its temp file, before the rename
    let full = serde_json::to_string_pretty(&committed).unwrap();
    let temp = store.dir().join("state.json.4242.deadbeef.tmp");
    fs::write(&temp, &full[..full.len() / 2]).unwrap();

    assert_eq!(present(&store), committed);

    // The next writer clears the leftover and commits normally
    store.append_task(Task::new("T2", "next")).unwrap();
    assert!(!temp.exists());
    assert_eq!(present(&store).tasks.len(), 2);
}

#[test]
fn corrupt_bytes_are_reported() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    store.append_task(Task::new("T1", "a")).unwrap();

    fs::write(store.state_path(), "q}7").unwrap();

    match store.load() {
        Err(StoreError::CorruptState { path, .. }) => assert_eq!(path, store.state_path()),
        other => panic!("expected CorruptState, got {other:?}"),
    }
    assert!(matches!(store.snapshot().unwrap(), Snapshot::Corrupt { .. }));
    assert_eq!(fs::read_to_string(store.state_path()).unwrap(), "q}7");
}

// ============================================================================
// Escalations
// ============================================================================

#[test]
fn resolving_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    store.append_task(Task::new("T1", "deploy")).unwrap();
    let raised = store
        .raise_escalation(Escalation::new(
            AgentRole::EngineerA,
            "needs prod credentials",
            Some("T1"),
        ))
        .unwrap();

    store.resolve_escalation(&raised.id).unwrap();
    let again = store.resolve_escalation(&raised.id).unwrap();

    assert!(again.resolved);
    let state = present(&store);
    assert!(state.escalations[0].resolved);
    assert_eq!(state.unresolved_escalations().count(), 0);
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn session_scenario_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    assert_eq!(store.snapshot().unwrap(), Snapshot::NoStore);

    let session = store.start_session(Some("ship the importer")).unwrap();
    store
        .append_task(Task::new("T1", "write importer").assigned_to(AgentRole::EngineerA))
        .unwrap();
    store
        .append_task(Task::new("T2", "review importer").assigned_to(AgentRole::EngineerB))
        .unwrap();
    store.update_task_status("T1", TaskStatus::InProgress).unwrap();
    store.update_task_status("T1", TaskStatus::Done).unwrap();
    store
        .raise_escalation(Escalation::new(
            AgentRole::EngineerB,
            "ambiguous requirement",
            Some("T2"),
        ))
        .unwrap();

    let Snapshot::Active(view) = store.snapshot().unwrap() else {
        panic!("expected an active session");
    };
    assert_eq!(view.session.id, session.id);
    assert_eq!(
        view.counts,
        TaskCounts {
            pending: 1,
            in_progress: 0,
            done: 1,
            total: 2
        }
    );
    assert_eq!(view.unresolved_escalations.len(), 1);
    assert_eq!(view.unresolved_escalations[0].task_id.as_deref(), Some("T2"));
}
