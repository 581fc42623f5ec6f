// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the watchpoint registry

use super::*;

#[test]
fn install_is_lookup_or_insert() {
    let mut reg = Registry::new();
    let (a, created) = reg.install(Path::new("/watch/a"));
    assert!(created);
    let (b, created) = reg.install(Path::new("/watch/a"));
    assert!(!created);
    assert_eq!(a, b);
    assert_eq!(reg.path_count(), 1);
}

#[test]
fn fresh_watchpoint_is_uninstalled() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    let wp = reg.get(id).unwrap();
    assert!(wp.wd.is_none());
    assert!(wp.handlers.is_empty());
    assert_eq!(reg.refcnt(id), Some(1));
}

#[test]
fn lookup_finds_by_path() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    assert_eq!(reg.lookup(Path::new("/watch/a")), Some(id));
    assert_eq!(reg.lookup(Path::new("/watch/b")), None);
}

#[test]
fn wd_index_tracks_registration() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    reg.set_wd(id, 7);
    assert_eq!(reg.by_wd(7), Some(id));
    assert_eq!(reg.refcnt(id), Some(2));
    assert!(reg.any_installed());

    reg.clear_wd(id);
    assert_eq!(reg.by_wd(7), None);
    assert_eq!(reg.refcnt(id), Some(1));
}

#[test]
fn remove_path_frees_last_reference() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    reg.remove_path(id);
    assert!(reg.get(id).is_none());
    assert_eq!(reg.path_count(), 0);
}

#[test]
fn extra_reference_keeps_entry_alive() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    reg.add_ref(id);
    reg.remove_path(id);
    // Still alive through the sentinel-style reference.
    assert!(reg.get(id).is_some());
    assert_eq!(reg.lookup(Path::new("/watch/a")), None);

    reg.reinstall(id);
    assert_eq!(reg.lookup(Path::new("/watch/a")), Some(id));
    assert_eq!(reg.refcnt(id), Some(2));
}

#[test]
fn stale_ids_do_not_resolve_after_slot_reuse() {
    let mut reg = Registry::new();
    let (old, _) = reg.install(Path::new("/watch/a"));
    reg.remove_path(old);
    let (new, _) = reg.install(Path::new("/watch/b"));
    // The slot was reused with a bumped generation.
    assert!(reg.get(old).is_none());
    assert!(reg.get(new).is_some());
    assert_ne!(old, new);
}

#[test]
fn gc_queue_drains() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    reg.queue_gc(id);
    assert_eq!(reg.take_gc(), vec![id]);
    assert!(reg.take_gc().is_empty());
}

#[test]
fn recent_cache_suppresses_within_ttl() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    reg.recent_init(id);

    assert!(!reg.recent_seen(id, OsStr::new("n")));
    assert!(reg.recent_seen(id, OsStr::new("n")));
    assert!(!reg.recent_seen(id, OsStr::new("other")));
}

#[test]
fn without_cache_nothing_is_suppressed() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    assert!(!reg.recent_seen(id, OsStr::new("n")));
    assert!(!reg.recent_seen(id, OsStr::new("n")));
}

#[test]
fn recent_cleanup_expires_old_caches_only() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    reg.recent_init(id);
    assert!(reg.recent_seen(id, OsStr::new("n")) == false);

    // Before the TTL nothing expires.
    reg.recent_cleanup(Instant::now());
    assert!(reg.recent_seen(id, OsStr::new("n")));

    // At or past the TTL the cache goes away and the name is fresh again.
    reg.recent_cleanup(Instant::now() + RECENT_TTL);
    assert!(!reg.recent_seen(id, OsStr::new("n")));
}

#[test]
fn recent_deinit_is_idempotent() {
    let mut reg = Registry::new();
    let (id, _) = reg.install(Path::new("/watch/a"));
    reg.recent_init(id);
    reg.recent_deinit(id);
    reg.recent_deinit(id);
    assert!(!reg.recent_seen(id, OsStr::new("n")));
}
