use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;

use crate::walker::has_hidden_component;

/// Quiet period after the last change before a rescan is requested.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// A batch is flushed after this long even if changes keep arriving.
const MAX_BATCH_WAIT: Duration = Duration::from_secs(30);

/// How often [`run_rescans`] checks for cancellation while idle.
const RESCAN_POLL: Duration = Duration::from_millis(500);

/// Watches the library root and coalesces bursts of changes into batches.
///
/// Hidden paths (any component starting with `.`) are ignored. Directory
/// events are kept since creating or removing a folder changes the library.
pub struct LibraryWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Vec<PathBuf>>,
}

impl LibraryWatcher {
    /// A batch is sent once no event has arrived for `debounce_ms`, or
    /// after `MAX_BATCH_WAIT` under a continuous stream of changes.
    pub fn new(root: &Path, debounce_ms: u64) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel::<Event>();
        let (batch_tx, batch_rx) = mpsc::channel::<Vec<PathBuf>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = raw_tx.send(event);
                }
            },
            Config::default(),
        )
        .context("failed to create filesystem watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;

        // Events carry canonical paths on some platforms.
        let mut roots = vec![root.to_path_buf()];
        if let Ok(canonical) = root.canonicalize() {
            roots.push(canonical);
        }
        let debounce = Duration::from_millis(debounce_ms);

        std::thread::Builder::new()
            .name("library-watcher-debounce".into())
            .spawn(move || loop {
                let first = match raw_rx.recv() {
                    Ok(ev) => ev,
                    Err(_) => return,
                };

                let mut paths = HashSet::new();
                collect_paths(&first, &roots, &mut paths);

                let cap = Instant::now() + MAX_BATCH_WAIT;
                let mut deadline = (Instant::now() + debounce).min(cap);
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    match raw_rx.recv_timeout(remaining) {
                        Ok(ev) => {
                            collect_paths(&ev, &roots, &mut paths);
                            deadline = (Instant::now() + debounce).min(cap);
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => break,
                        Err(mpsc::RecvTimeoutError::Disconnected) => {
                            if !paths.is_empty() {
                                let _ = batch_tx.send(paths.into_iter().collect());
                            }
                            return;
                        }
                    }
                }

                if !paths.is_empty() && batch_tx.send(paths.into_iter().collect()).is_err() {
                    return;
                }
            })
            .context("failed to spawn debounce thread")?;

        Ok(Self {
            _watcher: watcher,
            rx: batch_rx,
        })
    }

    /// Block until a batch of changed paths arrives (up to `timeout`).
    /// Returns an empty vec on timeout.
    pub fn wait_for_changes(&self, timeout: Duration) -> Vec<PathBuf> {
        self.rx.recv_timeout(timeout).unwrap_or_default()
    }

    /// Discard batches that queued up while a scan was running and report how
    /// many there were. One rescan covers all of them.
    pub fn drain_pending(&self) -> usize {
        self.rx.try_iter().count()
    }
}

/// Call `rescan` for every batch of changes until `shutdown` is cancelled.
///
/// Batches that queue up while `rescan` runs are coalesced into a single
/// follow-up call.
pub fn run_rescans(
    watcher: &LibraryWatcher,
    shutdown: &CancellationToken,
    mut rescan: impl FnMut(),
) {
    while !shutdown.is_cancelled() {
        let changed = watcher.wait_for_changes(RESCAN_POLL);
        if changed.is_empty() {
            continue;
        }
        tracing::info!(paths = changed.len(), "library changed, rescanning");
        rescan();
        let skipped = watcher.drain_pending();
        if skipped > 0 {
            tracing::info!(batches = skipped, "changes during scan, rescanning");
            rescan();
        }
    }
}

fn collect_paths(event: &Event, roots: &[PathBuf], out: &mut HashSet<PathBuf>) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    for path in &event.paths {
        let hidden = roots
            .iter()
            .find(|root| path.starts_with(root))
            .is_some_and(|root| has_hidden_component(path, root));
        if hidden {
            continue;
        }
        out.insert(path.clone());
    }
}
