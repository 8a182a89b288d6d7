//! Debounced filesystem event source for the vault.
//!
//! Raw OS events flow from the notify backend into a worker thread that
//! keeps one pending entry per path. Within the debounce window the latest
//! op wins, so editor save-through-temp-rename bursts coalesce into a
//! single event. Output channels are bounded; when saturated, events are
//! dropped and the index stays eventually consistent via a full rebuild.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use ignore::WalkBuilder;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::error::Result;

/// Per-path debounce window.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const ERROR_CHANNEL_CAPACITY: usize = 64;
const RAW_CHANNEL_CAPACITY: usize = 4096;

/// Effective operation carried by a note event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Write,
    Delete,
    /// Metadata-only change (e.g. chmod); consumers treat it as a no-op.
    Other,
}

/// A debounced event for one note file.
#[derive(Debug, Clone)]
pub struct NoteEvent {
    pub path: PathBuf,
    pub op: Op,
    pub timestamp: SystemTime,
}

enum RawMsg {
    Fs(Event),
    Err(notify::Error),
}

/// Watcher over a vault, producing debounced per-path note events.
pub struct VaultWatcher {
    events: Receiver<NoteEvent>,
    errors: Receiver<notify::Error>,
    watcher: Option<Arc<Mutex<RecommendedWatcher>>>,
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl VaultWatcher {
    /// Start watching the vault. Every directory under the root except the
    /// state directory is registered; directories created later are added
    /// when their create events surface.
    pub fn start(cfg: &VaultConfig) -> Result<Self> {
        let state_dir = cfg.state_dir_path();
        let extension = cfg.extension.clone();

        let (raw_tx, raw_rx) = bounded::<RawMsg>(RAW_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = bounded::<NoteEvent>(EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = bounded::<notify::Error>(ERROR_CHANNEL_CAPACITY);

        let callback_tx = raw_tx.clone();
        let watcher = notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
            let msg = match res {
                Ok(event) => RawMsg::Fs(event),
                Err(e) => RawMsg::Err(e),
            };
            // Saturated channel: drop, callers rebuild to reconcile.
            let _ = callback_tx.try_send(msg);
        })?;
        let watcher = Arc::new(Mutex::new(watcher));

        register_dirs(&watcher, &cfg.root, &state_dir)?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let watcher = Arc::clone(&watcher);
            let stop = Arc::clone(&stop);
            let state_dir = state_dir.clone();
            std::thread::Builder::new()
                .name("notegraph-debounce".to_string())
                .spawn(move || {
                    debounce_loop(
                        raw_rx, event_tx, error_tx, watcher, state_dir, extension, stop,
                    )
                })?
        };

        info!(vault = %cfg.root.display(), "Watcher started");
        Ok(Self {
            events: event_rx,
            errors: error_rx,
            watcher: Some(watcher),
            worker: Some(worker),
            stop,
        })
    }

    /// Debounced note events.
    pub fn events(&self) -> &Receiver<NoteEvent> {
        &self.events
    }

    /// Errors surfaced by the OS watcher.
    pub fn errors(&self) -> &Receiver<notify::Error> {
        &self.errors
    }

    /// Stop watching: release OS watches and close the output channels.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("Watcher stopped");
        }
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Register every directory under `root` except the state directory.
fn register_dirs(
    watcher: &Arc<Mutex<RecommendedWatcher>>,
    root: &Path,
    state_dir: &Path,
) -> Result<()> {
    let state_dir = state_dir.to_path_buf();
    let walk = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| entry.path() != state_dir)
        .build();
    let mut guard = watcher.lock().expect("watcher mutex poisoned");
    for entry in walk {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Walk error while registering watches: {e}");
                continue;
            }
        };
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            guard.watch(entry.path(), RecursiveMode::NonRecursive)?;
            debug!(dir = %entry.path().display(), "Watching directory");
        }
    }
    Ok(())
}

struct Pending {
    op: Op,
    timestamp: SystemTime,
    deadline: Instant,
}

#[allow(clippy::too_many_arguments)]
fn debounce_loop(
    raw_rx: Receiver<RawMsg>,
    event_tx: Sender<NoteEvent>,
    error_tx: Sender<notify::Error>,
    watcher: Arc<Mutex<RecommendedWatcher>>,
    state_dir: PathBuf,
    extension: String,
    stop: Arc<AtomicBool>,
) {
    let mut pending: HashMap<PathBuf, Pending> = HashMap::new();
    let idle = Duration::from_millis(200);

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let now = Instant::now();
        let timeout = pending
            .values()
            .map(|p| p.deadline.saturating_duration_since(now))
            .min()
            .map(|d| d.min(idle))
            .unwrap_or(idle);

        match raw_rx.recv_timeout(timeout) {
            Ok(RawMsg::Fs(event)) => {
                handle_fs_event(&event, &mut pending, &watcher, &state_dir, &extension);
            }
            Ok(RawMsg::Err(e)) => {
                // Full error channel: drop.
                let _ = error_tx.try_send(e);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        flush_due(&mut pending, &event_tx);
    }

    // Emit whatever is still pending so a clean stop loses nothing.
    let now = Instant::now();
    for p in pending.values_mut() {
        p.deadline = now;
    }
    flush_due(&mut pending, &event_tx);
}

/// Fold one raw OS event into the pending map. The last op for a path
/// within the window wins.
fn handle_fs_event(
    event: &Event,
    pending: &mut HashMap<PathBuf, Pending>,
    watcher: &Arc<Mutex<RecommendedWatcher>>,
    state_dir: &Path,
    extension: &str,
) {
    let ops = classify(&event.kind, event.paths.len());
    for (idx, path) in event.paths.iter().enumerate() {
        if path.starts_with(state_dir) {
            continue;
        }
        let op = match ops.get(idx.min(ops.len().saturating_sub(1))) {
            Some(op) => *op,
            None => continue,
        };

        // New directories extend the watch set so files created inside
        // them still surface.
        if matches!(op, Op::Create) && path.is_dir() {
            if let Ok(mut guard) = watcher.lock() {
                if let Err(e) = guard.watch(path, RecursiveMode::NonRecursive) {
                    warn!(dir = %path.display(), "Failed to extend watch set: {e}");
                } else {
                    debug!(dir = %path.display(), "Watching new directory");
                }
            }
            continue;
        }

        let is_note = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == extension)
            .unwrap_or(false);
        if !is_note {
            continue;
        }

        pending.insert(
            path.clone(),
            Pending {
                op,
                timestamp: SystemTime::now(),
                deadline: Instant::now() + DEBOUNCE_WINDOW,
            },
        );
    }
}

/// Map a notify event kind onto ops, one per event path. A two-path rename
/// is a delete of the first path and a write of the second.
fn classify(kind: &EventKind, path_count: usize) -> Vec<Op> {
    match kind {
        EventKind::Create(_) => vec![Op::Create],
        EventKind::Remove(_) => vec![Op::Delete],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => vec![Op::Delete],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => vec![Op::Write],
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path_count >= 2 {
                vec![Op::Delete, Op::Write]
            } else {
                vec![Op::Write]
            }
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => vec![Op::Other],
        EventKind::Modify(_) => vec![Op::Write],
        EventKind::Access(_) => vec![],
        EventKind::Any | EventKind::Other => vec![Op::Other],
    }
}

/// Emit every pending entry whose deadline has passed.
fn flush_due(pending: &mut HashMap<PathBuf, Pending>, event_tx: &Sender<NoteEvent>) {
    let now = Instant::now();
    let due: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, p)| p.deadline <= now)
        .map(|(path, _)| path.clone())
        .collect();
    for path in due {
        if let Some(p) = pending.remove(&path) {
            let event = NoteEvent {
                path,
                op: p.op,
                timestamp: p.timestamp,
            };
            if event_tx.try_send(event).is_err() {
                // Full output channel: drop for this path.
                warn!("Event channel saturated, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rename_pair() {
        let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        assert_eq!(classify(&kind, 2), vec![Op::Delete, Op::Write]);
    }

    #[test]
    fn test_classify_metadata_is_other() {
        let kind = EventKind::Modify(ModifyKind::Metadata(notify::event::MetadataKind::Any));
        assert_eq!(classify(&kind, 1), vec![Op::Other]);
    }

    #[test]
    fn test_classify_access_is_ignored() {
        let kind = EventKind::Access(notify::event::AccessKind::Any);
        assert!(classify(&kind, 1).is_empty());
    }
}
