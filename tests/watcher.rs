//! Integration tests: filesystem watcher and debounce behavior.
//!
//! These exercise real OS watchers; waits are generous to stay stable on
//! slow CI filesystems.

use std::fs;
use std::time::{Duration, Instant};

use notegraph::{NoteEvent, Op, VaultConfig, VaultWatcher};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn vault() -> (TempDir, VaultConfig) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let cfg = VaultConfig::new(root);
    fs::create_dir_all(cfg.root.join("note")).unwrap();
    fs::create_dir_all(cfg.state_dir_path()).unwrap();
    (dir, cfg)
}

/// Drain events until `deadline` passes with no new arrivals.
fn collect_events(watcher: &VaultWatcher, quiet: Duration, max_wait: Duration) -> Vec<NoteEvent> {
    let mut events = Vec::new();
    let start = Instant::now();
    let mut last = Instant::now();
    loop {
        match watcher.events().recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                events.push(event);
                last = Instant::now();
            }
            Err(_) => {
                if last.elapsed() >= quiet || start.elapsed() >= max_wait {
                    break;
                }
            }
        }
    }
    events
}

fn settle() {
    std::thread::sleep(Duration::from_millis(250));
}

// ---------------------------------------------------------------------------
// Debounce
// ---------------------------------------------------------------------------

#[test]
fn rapid_writes_coalesce() {
    let (_dir, cfg) = vault();
    let mut watcher = VaultWatcher::start(&cfg).unwrap();
    settle();

    let path = cfg.root.join("note/a.Rmd");
    for i in 0..10 {
        fs::write(&path, format!("---\nid: a\ntype: note\nkey: a\n---\nrev {i}\n")).unwrap();
        std::thread::sleep(Duration::from_millis(5));
    }

    let events = collect_events(&watcher, Duration::from_millis(600), Duration::from_secs(5));
    watcher.stop();

    let for_path: Vec<&NoteEvent> = events.iter().filter(|e| e.path == path).collect();
    assert!(!for_path.is_empty(), "burst must surface at least one event");
    assert!(
        for_path.len() < 10,
        "ten writes within the window must coalesce, got {}",
        for_path.len()
    );
    assert_eq!(for_path.last().unwrap().op, Op::Write);
}

#[test]
fn delete_surfaces_as_delete() {
    let (_dir, cfg) = vault();
    let path = cfg.root.join("note/a.Rmd");
    fs::write(&path, "---\nid: a\ntype: note\nkey: a\n---\n").unwrap();

    let mut watcher = VaultWatcher::start(&cfg).unwrap();
    settle();

    fs::remove_file(&path).unwrap();
    let events = collect_events(&watcher, Duration::from_millis(600), Duration::from_secs(5));
    watcher.stop();

    let last = events
        .iter()
        .filter(|e| e.path == path)
        .next_back()
        .expect("delete event");
    assert_eq!(last.op, Op::Delete);
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[test]
fn non_note_files_are_ignored() {
    let (_dir, cfg) = vault();
    let mut watcher = VaultWatcher::start(&cfg).unwrap();
    settle();

    fs::write(cfg.root.join("note/readme.md"), "not a note\n").unwrap();
    fs::write(cfg.root.join("note/lower.rmd"), "wrong case\n").unwrap();
    let events = collect_events(&watcher, Duration::from_millis(400), Duration::from_secs(3));
    watcher.stop();

    assert!(events.is_empty(), "unexpected events: {events:?}");
}

#[test]
fn state_directory_is_excluded() {
    let (_dir, cfg) = vault();
    let mut watcher = VaultWatcher::start(&cfg).unwrap();
    settle();

    fs::write(cfg.state_dir_path().join("scratch.Rmd"), "internal\n").unwrap();
    let events = collect_events(&watcher, Duration::from_millis(400), Duration::from_secs(3));
    watcher.stop();

    assert!(events.is_empty(), "unexpected events: {events:?}");
}

#[test]
fn new_directories_extend_the_watch_set() {
    let (_dir, cfg) = vault();
    let mut watcher = VaultWatcher::start(&cfg).unwrap();
    settle();

    let sub = cfg.root.join("note/projects");
    fs::create_dir_all(&sub).unwrap();
    // Give the watcher time to process the directory create event.
    std::thread::sleep(Duration::from_millis(500));

    let path = sub.join("deep.Rmd");
    fs::write(&path, "---\nid: d\ntype: note\nkey: projects/deep\n---\n").unwrap();

    let events = collect_events(&watcher, Duration::from_millis(600), Duration::from_secs(5));
    watcher.stop();

    assert!(
        events.iter().any(|e| e.path == path),
        "file inside a freshly created directory must surface: {events:?}"
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn stop_is_idempotent_and_closes_channels() {
    let (_dir, cfg) = vault();
    let mut watcher = VaultWatcher::start(&cfg).unwrap();
    watcher.stop();
    watcher.stop();

    // Once stopped, the event channel disconnects.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match watcher.events().recv_timeout(Duration::from_millis(100)) {
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            Ok(_) => {}
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                assert!(Instant::now() < deadline, "event channel never closed");
            }
        }
    }
}
