// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for unified event dispatch and CHANGE synthesis

use super::*;
use crate::handler::{Handler, HandlerFlags, ProgHandler};
use crate::store::RECENT_TTL;
use direvent_adapters::fake::{
    FAKE_CLOSE_WRITE, FAKE_CREATE, FAKE_DELETE, FAKE_MODIFY, FAKE_WRITE_SELF,
};
use direvent_adapters::{FakeBackend, FAKE_FD_PROFILE, FAKE_PROFILE};
use direvent_core::{EnvopProgram, EventMask, PatternList, GENEV_CREATE, GENEV_DELETE};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::engine::Engine;

/// A nowait handler that appends one line to `marker` per invocation.
fn counting_handler(mask: EventMask, pattern: Option<&str>, marker: &Path) -> Handler {
    let mut patterns = PatternList::new();
    if let Some(p) = pattern {
        patterns.add_spec(p).unwrap();
    }
    Handler::program(
        mask,
        patterns,
        ProgHandler {
            command: format!("echo hit >> {}", marker.display()),
            flags: HandlerFlags {
                nowait: true,
                shell: true,
                ..HandlerFlags::default()
            },
            uid: None,
            gids: Vec::new(),
            timeout: Duration::from_secs(5),
            envop: EnvopProgram::new(),
        },
    )
}

fn count(marker: &Path) -> usize {
    std::fs::read_to_string(marker)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

async fn wait_count(marker: &Path, expected: usize) {
    for _ in 0..60 {
        if count(marker) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "marker {} never reached {} (at {})",
        marker.display(),
        expected,
        count(marker)
    );
}

fn engine() -> Engine<FakeBackend> {
    Engine::new(FakeBackend::new(&FAKE_PROFILE), EnvopProgram::new())
}

#[tokio::test]
async fn matching_handler_runs_for_child_event() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let marker = outside.path().join("marker");

    let mut engine = engine();
    let id = engine.register(
        dir.path(),
        0,
        counting_handler(EventMask::generic(GENEV_CREATE), Some("*.log"), &marker),
    );
    engine.setup().await.unwrap();
    let wd = engine.store().get(id).unwrap().wd.unwrap();

    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_CREATE,
            name: Some("data.log".into()),
        })
        .await;
    wait_count(&marker, 1).await;

    // A non-matching name runs nothing.
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_CREATE,
            name: Some("data.tmp".into()),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(&marker), 1);
}

#[tokio::test]
async fn change_fires_on_close_write_after_modify_only() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("file.txt");
    std::fs::write(&target, b"x").unwrap();
    let outside = TempDir::new().unwrap();
    let marker = outside.path().join("marker");

    let mut engine = engine();
    let id = engine.register(
        &target,
        0,
        counting_handler(
            EventMask::generic(direvent_core::GENEV_CHANGE),
            None,
            &marker,
        ),
    );
    engine.setup().await.unwrap();
    let wd = engine.store().get(id).unwrap().wd.unwrap();

    // A write alone does not fire CHANGE.
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_MODIFY,
            name: None,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(&marker), 0);

    // The close after the write fires it exactly once.
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_CLOSE_WRITE,
            name: None,
        })
        .await;
    wait_count(&marker, 1).await;

    // A close without a prior write is suppressed.
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_CLOSE_WRITE,
            name: None,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(&marker), 1);
}

#[tokio::test]
async fn change_tracking_is_per_file_for_named_events() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let marker = outside.path().join("marker");

    let mut engine = engine();
    let id = engine.register(
        dir.path(),
        0,
        counting_handler(
            EventMask::generic(direvent_core::GENEV_CHANGE),
            None,
            &marker,
        ),
    );
    engine.setup().await.unwrap();
    let wd = engine.store().get(id).unwrap().wd.unwrap();

    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_MODIFY,
            name: Some("a".into()),
        })
        .await;
    // Closing a different file must not fire.
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_CLOSE_WRITE,
            name: Some("b".into()),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(&marker), 0);

    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_CLOSE_WRITE,
            name: Some("a".into()),
        })
        .await;
    wait_count(&marker, 1).await;
}

#[tokio::test]
async fn create_then_delete_runs_both_and_suspends_child() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let marker = outside.path().join("marker");

    let mut engine = engine();
    let parent = engine.register(
        dir.path(),
        1,
        counting_handler(
            EventMask::generic(GENEV_CREATE | GENEV_DELETE),
            None,
            &marker,
        ),
    );
    engine.setup().await.unwrap();
    let wd = engine.store().get(parent).unwrap().wd.unwrap();

    // The entry exists long enough to be watched.
    std::fs::create_dir(dir.path().join("burst")).unwrap();
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_CREATE,
            name: Some("burst".into()),
        })
        .await;
    wait_count(&marker, 1).await;
    let child_path = dir.path().join("burst");
    assert!(engine.store().lookup(&child_path).is_some());

    std::fs::remove_dir(&child_path).unwrap();
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_DELETE,
            name: Some("burst".into()),
        })
        .await;
    wait_count(&marker, 2).await;
    // The named child's watchpoint was suspended after the DELETE.
    assert!(engine.store().lookup(&child_path).is_none());
    engine.watchpoint_gc();
}

#[tokio::test]
async fn recent_cache_suppresses_duplicate_create_until_ttl() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let marker = outside.path().join("marker");

    let mut engine = engine();
    let parent = engine.register(
        dir.path(),
        2,
        counting_handler(EventMask::generic(GENEV_CREATE), Some("inner"), &marker),
    );
    engine.setup().await.unwrap();
    let wd = engine.store().get(parent).unwrap().wd.unwrap();

    // A new subdirectory appears already containing an entry; the scan
    // delivers its CREATE and primes the recent cache.
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::create_dir(dir.path().join("sub").join("inner")).unwrap();
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_CREATE,
            name: Some("sub".into()),
        })
        .await;
    wait_count(&marker, 1).await;

    let sub = engine.store().lookup(&dir.path().join("sub")).unwrap();
    let sub_wd = engine.store().get(sub).unwrap().wd.unwrap();

    // The kernel's own CREATE for the same name arrives next and is
    // suppressed by the cache.
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd: sub_wd,
            mask: FAKE_CREATE,
            name: Some("inner".into()),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(&marker), 1);

    // Past the TTL the cache is gone and deliveries resume.
    engine.store.recent_cleanup(Instant::now() + RECENT_TTL);
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd: sub_wd,
            mask: FAKE_CREATE,
            name: Some("inner".into()),
        })
        .await;
    wait_count(&marker, 2).await;
}

#[tokio::test]
async fn self_event_on_directory_is_suppressed() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let marker = outside.path().join("marker");

    let mut engine = engine();
    let id = engine.register(
        dir.path(),
        0,
        counting_handler(EventMask::native(FAKE_MODIFY), None, &marker),
    );
    engine.setup().await.unwrap();
    let wd = engine.store().get(id).unwrap().wd.unwrap();

    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_MODIFY,
            name: None,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(&marker), 0);
}

#[tokio::test]
async fn rescan_trigger_delivers_creates_on_fd_backend() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let marker = outside.path().join("marker");

    let mut engine = Engine::new(FakeBackend::new(&FAKE_FD_PROFILE), EnvopProgram::new());
    let id = engine.register(
        dir.path(),
        0,
        counting_handler(EventMask::generic(GENEV_CREATE), None, &marker),
    );
    engine.setup().await.unwrap();
    let wd = engine.store().get(id).unwrap().wd.unwrap();

    // New file appears; the directory write triggers a rescan which
    // delivers the CREATE and installs a watch for the file.
    std::fs::write(dir.path().join("fresh"), b"x").unwrap();
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd,
            mask: FAKE_WRITE_SELF,
            name: None,
        })
        .await;
    wait_count(&marker, 1).await;
    assert!(engine.store().lookup(&dir.path().join("fresh")).is_some());
}

#[tokio::test]
async fn overflow_and_unknown_watch_are_ignored() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.register(dir.path(), 0, counting_handler(
        EventMask::generic(GENEV_CREATE),
        None,
        &PathBuf::from("/nonexistent/marker"),
    ));
    engine.setup().await.unwrap();

    engine.dispatch_event(direvent_core::RawEvent::Overflow).await;
    engine
        .dispatch_event(direvent_core::RawEvent::Notify {
            wd: 9999,
            mask: FAKE_CREATE,
            name: Some("x".into()),
        })
        .await;
    assert!(!engine.stopped());
}
