use std::fs;
use std::time::{Duration, Instant};

use shelf_core::watcher::{run_rescans, LibraryWatcher};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_watcher_detects_file_changes() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("game.sgf");
    fs::write(&file_path, "(;SZ[9])").unwrap();

    let watcher = LibraryWatcher::new(dir.path(), 100).unwrap();

    // Give the watcher time to initialize and register with the OS backend.
    std::thread::sleep(Duration::from_millis(200));

    fs::write(&file_path, "(;SZ[9];B[ee])").unwrap();

    let changed = watcher.wait_for_changes(Duration::from_secs(2));
    assert!(
        !changed.is_empty(),
        "expected at least one changed path, got none"
    );

    // On macOS FSEvents may report the canonical (resolved) path.
    let canonical = file_path.canonicalize().unwrap();
    assert!(
        changed.iter().any(|p| *p == file_path || *p == canonical),
        "expected changed paths to contain {}, got: {:?}",
        file_path.display(),
        changed
    );
}

#[test]
fn test_watcher_reports_new_folders() {
    let dir = tempdir().unwrap();
    let watcher = LibraryWatcher::new(dir.path(), 100).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let folder = dir.path().join("joseki");
    fs::create_dir(&folder).unwrap();

    let changed = watcher.wait_for_changes(Duration::from_secs(2));
    let canonical = folder.canonicalize().unwrap();
    assert!(
        changed.iter().any(|p| *p == folder || *p == canonical),
        "expected {} in {:?}",
        folder.display(),
        changed
    );
}

#[test]
fn test_watcher_ignores_hidden_paths() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();

    let watcher = LibraryWatcher::new(dir.path(), 100).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    fs::write(dir.path().join(".git").join("index"), "x").unwrap();
    fs::write(dir.path().join(".draft.html"), "x").unwrap();

    let changed = watcher.wait_for_changes(Duration::from_millis(800));
    assert!(changed.is_empty(), "hidden changes leaked: {changed:?}");
}

#[test]
fn test_drain_pending_counts_queued_batches() {
    let dir = tempdir().unwrap();
    let watcher = LibraryWatcher::new(dir.path(), 50).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(watcher.drain_pending(), 0);

    fs::write(dir.path().join("a.pdf"), "x").unwrap();
    std::thread::sleep(Duration::from_millis(500));
    assert!(watcher.drain_pending() >= 1);
    assert_eq!(watcher.drain_pending(), 0);
}

#[test]
fn test_continuous_changes_hold_the_batch_until_quiet() {
    let dir = tempdir().unwrap();
    let watcher = LibraryWatcher::new(dir.path(), 400).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let root = dir.path().to_path_buf();
    let writer = std::thread::spawn(move || {
        let start = Instant::now();
        let mut n = 0;
        while start.elapsed() < Duration::from_millis(1500) {
            fs::write(root.join(format!("page-{n}.html")), "x").unwrap();
            n += 1;
            std::thread::sleep(Duration::from_millis(50));
        }
    });

    // Changes keep arriving well inside the quiet period.
    let during = watcher.wait_for_changes(Duration::from_millis(1200));
    assert!(during.is_empty(), "batch sent mid-burst: {during:?}");

    writer.join().unwrap();
    let after = watcher.wait_for_changes(Duration::from_secs(3));
    assert!(after.len() > 1, "expected one batch for the whole burst, got {after:?}");
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(watcher.drain_pending(), 0);
}

#[test]
fn test_run_rescans_coalesces_batches_queued_during_a_scan() {
    let dir = tempdir().unwrap();
    let watcher = LibraryWatcher::new(dir.path(), 50).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(3));
            shutdown.cancel();
        });
    }

    fs::write(dir.path().join("first.sgf"), "(;)").unwrap();

    let mut calls = 0;
    run_rescans(&watcher, &shutdown, || {
        calls += 1;
        if calls == 1 {
            // Two separate batches land while the first scan runs.
            fs::write(dir.path().join("second.sgf"), "(;)").unwrap();
            std::thread::sleep(Duration::from_millis(300));
            fs::write(dir.path().join("third.sgf"), "(;)").unwrap();
            std::thread::sleep(Duration::from_millis(300));
        }
    });

    assert_eq!(calls, 2, "one scan for the change plus one follow-up");
}
