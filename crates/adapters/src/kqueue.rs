// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fd-per-watch backend over kqueue.
//!
//! Every watched path is held open read-only and registered as an
//! `EVFILT_VNODE` kevent. Registration and removal are shipped to the
//! reader thread over a command channel and applied between polls; the
//! open file stays with the backend so the descriptor lives exactly as
//! long as the watch.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use kqueue::{EventData, EventFilter, FilterFlag, Ident, Vnode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use direvent_core::backend::{Backend, BackendProfile, RawEvent, WatchHandle};
use direvent_core::event::{generic_to_native, EventMask, TransTab, GENEV_CHANGE, GENEV_CREATE};

pub const NOTE_DELETE: u32 = 0x0000_0001;
pub const NOTE_WRITE: u32 = 0x0000_0002;
pub const NOTE_EXTEND: u32 = 0x0000_0004;
pub const NOTE_ATTRIB: u32 = 0x0000_0008;
pub const NOTE_LINK: u32 = 0x0000_0010;
pub const NOTE_RENAME: u32 = 0x0000_0020;
pub const NOTE_REVOKE: u32 = 0x0000_0040;
pub const NOTE_OPEN: u32 = 0x0000_0080;
pub const NOTE_CLOSE: u32 = 0x0000_0100;
pub const NOTE_CLOSE_WRITE: u32 = 0x0000_0200;
pub const NOTE_READ: u32 = 0x0000_0400;

const WRITE_TRANSLATION: u32 = NOTE_WRITE | NOTE_EXTEND;

pub static KQUEUE_PROFILE: BackendProfile = BackendProfile {
    name: "kqueue",
    transtab: TransTab(&[
        ("DELETE", NOTE_DELETE),
        ("WRITE", NOTE_WRITE),
        ("EXTEND", NOTE_EXTEND),
        ("ATTRIB", NOTE_ATTRIB),
        ("LINK", NOTE_LINK),
        ("RENAME", NOTE_RENAME),
        ("REVOKE", NOTE_REVOKE),
        ("OPEN", NOTE_OPEN),
        ("CLOSE", NOTE_CLOSE),
        ("CLOSE_WRITE", NOTE_CLOSE_WRITE),
        ("READ", NOTE_READ),
    ]),
    xlat: &[
        (direvent_core::GENEV_WRITE, WRITE_TRANSLATION),
        (direvent_core::GENEV_ATTRIB, NOTE_ATTRIB | NOTE_LINK),
        (
            direvent_core::GENEV_DELETE,
            NOTE_DELETE | NOTE_RENAME | NOTE_REVOKE,
        ),
    ],
    changed_mask: WRITE_TRANSLATION,
    close_write: NOTE_CLOSE_WRITE,
    create_native: 0,
    delete_self: NOTE_DELETE | NOTE_RENAME,
    delete_child: 0,
    rescan_mask: NOTE_WRITE,
    watch_regular_files: true,
};

enum Cmd {
    Add { fd: RawFd, flags: u32 },
    Remove { fd: RawFd },
}

pub struct KqueueBackend {
    cmds: std_mpsc::Sender<Cmd>,
    files: HashMap<WatchHandle, File>,
    table: Arc<Mutex<HashMap<RawFd, WatchHandle>>>,
    next_handle: WatchHandle,
}

impl KqueueBackend {
    /// Open the event queue and spawn the reader thread.
    pub fn init(tx: mpsc::Sender<Vec<RawEvent>>) -> io::Result<Self> {
        let watcher = Watcher::new()?;
        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        let table: Arc<Mutex<HashMap<RawFd, WatchHandle>>> = Arc::new(Mutex::new(HashMap::new()));
        let reader_table = Arc::clone(&table);
        std::thread::Builder::new()
            .name("kqueue-reader".to_string())
            .spawn(move || reader(watcher, cmd_rx, reader_table, tx))?;
        Ok(Self {
            cmds: cmd_tx,
            files: HashMap::new(),
            table,
            next_handle: 0,
        })
    }
}

impl Backend for KqueueBackend {
    fn profile(&self) -> &'static BackendProfile {
        &KQUEUE_PROFILE
    }

    fn add_watch(&mut self, path: &Path, mask: &EventMask, isdir: bool) -> io::Result<WatchHandle> {
        let mut native =
            generic_to_native(mask, KQUEUE_PROFILE.xlat) | mask.native | NOTE_DELETE;
        if mask.generic & GENEV_CHANGE != 0 {
            native |= WRITE_TRANSLATION | NOTE_CLOSE_WRITE;
        }
        if isdir && mask.generic & GENEV_CREATE != 0 {
            native |= NOTE_WRITE;
        }

        let file = File::open(path)?;
        let fd = file.as_raw_fd();
        self.next_handle += 1;
        let handle = self.next_handle;

        self.table.lock().insert(fd, handle);
        self.files.insert(handle, file);
        if self.cmds.send(Cmd::Add { fd, flags: native }).is_err() {
            tracing::error!(path = %path.display(), "kqueue reader is gone");
        }
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle, _path: &Path) {
        if let Some(file) = self.files.remove(&handle) {
            let fd = file.as_raw_fd();
            self.table.lock().remove(&fd);
            let _ = self.cmds.send(Cmd::Remove { fd });
            // Closing the descriptor drops the kevent registration.
        }
    }
}

fn reader(
    mut watcher: Watcher,
    cmds: std_mpsc::Receiver<Cmd>,
    table: Arc<Mutex<HashMap<RawFd, WatchHandle>>>,
    tx: mpsc::Sender<Vec<RawEvent>>,
) {
    loop {
        let mut dirty = false;
        loop {
            match cmds.try_recv() {
                Ok(Cmd::Add { fd, flags }) => {
                    if let Err(error) = watcher.add_fd(
                        fd,
                        EventFilter::EVFILT_VNODE,
                        FilterFlag::from_bits_truncate(flags),
                    ) {
                        tracing::error!(fd, %error, "can't register kevent");
                    }
                    dirty = true;
                }
                Ok(Cmd::Remove { fd }) => {
                    let _ = watcher.remove_fd(fd, EventFilter::EVFILT_VNODE);
                    dirty = true;
                }
                Err(std_mpsc::TryRecvError::Empty) => break,
                Err(std_mpsc::TryRecvError::Disconnected) => return,
            }
        }
        if dirty {
            if let Err(error) = watcher.watch() {
                tracing::error!(%error, "kqueue registration failed");
            }
        }

        let Some(event) = watcher.poll(Some(Duration::from_millis(300))) else {
            continue;
        };
        let fd = match event.ident {
            Ident::Fd(fd) => fd,
            Ident::Filename(fd, _) => fd,
            _ => continue,
        };
        let Some(wd) = table.lock().get(&fd).copied() else {
            tracing::debug!(fd, "event for unregistered descriptor");
            continue;
        };
        let mask = match event.data {
            EventData::Vnode(vnode) => vnode_bits(&vnode),
            _ => continue,
        };
        if tx
            .blocking_send(vec![RawEvent::Notify {
                wd,
                mask,
                name: None,
            }])
            .is_err()
        {
            return;
        }
    }
}

fn vnode_bits(vnode: &Vnode) -> u32 {
    match vnode {
        Vnode::Delete => NOTE_DELETE,
        Vnode::Write => NOTE_WRITE,
        Vnode::Extend | Vnode::Truncate => NOTE_EXTEND,
        Vnode::Attrib => NOTE_ATTRIB,
        Vnode::Link => NOTE_LINK,
        Vnode::Rename => NOTE_RENAME,
        Vnode::Revoke => NOTE_REVOKE,
        Vnode::Open => NOTE_OPEN,
        Vnode::Close => NOTE_CLOSE,
        Vnode::CloseWrite => NOTE_CLOSE_WRITE,
        _ => 0,
    }
}
