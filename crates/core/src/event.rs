// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic and native event codes, translation tables and mask algebra.
//!
//! An [`EventMask`] carries a pair of bitfields: the portable generic
//! vocabulary exposed to handlers, and whatever the kernel backend uses
//! natively. Backends publish a translation table (`xlat`) mapping each
//! generic bit to the native bits that satisfy it; walking the table in
//! reverse turns native bits back into generic ones. `CHANGE` appears in
//! neither direction: it is synthesized by the dispatcher.

/// A file or directory appeared.
pub const GENEV_CREATE: u32 = 0x01;
/// The file was written to.
pub const GENEV_WRITE: u32 = 0x02;
/// File metadata changed.
pub const GENEV_ATTRIB: u32 = 0x04;
/// The file disappeared.
pub const GENEV_DELETE: u32 = 0x08;
/// Synthesized: the file was modified and then closed.
pub const GENEV_CHANGE: u32 = 0x10;

/// Name table for the generic event vocabulary, in delivery order.
pub const GENEV_TRANSTAB: TransTab = TransTab(&[
    ("create", GENEV_CREATE),
    ("write", GENEV_WRITE),
    ("attrib", GENEV_ATTRIB),
    ("delete", GENEV_DELETE),
    ("change", GENEV_CHANGE),
]);

/// A pair of event bitfields: generic vocabulary plus backend-native bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMask {
    pub generic: u32,
    pub native: u32,
}

impl EventMask {
    pub const EMPTY: EventMask = EventMask {
        generic: 0,
        native: 0,
    };

    pub fn generic(bits: u32) -> Self {
        EventMask {
            generic: bits,
            native: 0,
        }
    }

    pub fn native(bits: u32) -> Self {
        EventMask {
            generic: 0,
            native: bits,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.generic == 0 && self.native == 0
    }

    /// Bitwise intersection of both halves.
    pub fn and(&self, other: &EventMask) -> EventMask {
        EventMask {
            generic: self.generic & other.generic,
            native: self.native & other.native,
        }
    }

    /// Bitwise union of both halves.
    pub fn or(&self, other: &EventMask) -> EventMask {
        EventMask {
            generic: self.generic | other.generic,
            native: self.native | other.native,
        }
    }
}

/// An ordered symbolic-name table for a set of event bits.
#[derive(Debug, Clone, Copy)]
pub struct TransTab(pub &'static [(&'static str, u32)]);

impl TransTab {
    /// Resolve a symbolic name to its code.
    pub fn to_code(&self, name: &str) -> Option<u32> {
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, code)| *code)
    }

    /// Resolve an exact code back to its symbolic name.
    pub fn to_name(&self, code: u32) -> Option<&'static str> {
        self.0.iter().find(|(_, c)| *c == code).map(|(n, _)| *n)
    }

    /// Names of all set bits, in table order.
    pub fn names(&self, mask: u32) -> impl Iterator<Item = &'static str> + '_ {
        self.0
            .iter()
            .filter(move |(_, code)| code & mask != 0)
            .map(|(name, _)| *name)
    }

    /// Space-joined names of all set bits, in table order.
    pub fn format(&self, mask: u32) -> String {
        self.names(mask).collect::<Vec<_>>().join(" ")
    }

    /// Parse a whitespace-separated name list back into a mask.
    /// Unknown names yield `None`.
    pub fn parse(&self, input: &str) -> Option<u32> {
        let mut mask = 0;
        for word in input.split_whitespace() {
            mask |= self.to_code(word)?;
        }
        Some(mask)
    }

    /// Union of every code in the table.
    pub fn full_mask(&self) -> u32 {
        self.0.iter().fold(0, |acc, (_, code)| acc | code)
    }
}

/// Translate native bits into an [`EventMask`]: every xlat row whose native
/// half intersects contributes its generic bit.
pub fn native_to_generic(fflags: u32, xlat: &[(u32, u32)]) -> EventMask {
    let mut generic = 0;
    for (gen, native) in xlat {
        if native & fflags != 0 {
            generic |= gen;
        }
    }
    EventMask {
        generic,
        native: fflags,
    }
}

/// Expand the generic half of a mask into native bits.
pub fn generic_to_native(mask: &EventMask, xlat: &[(u32, u32)]) -> u32 {
    let mut out = 0;
    for (gen, native) in xlat {
        if gen & mask.generic != 0 {
            out |= native;
        }
    }
    out
}

/// Resolve an event name, trying the generic vocabulary first and the
/// backend's native table second.
pub fn getevt(name: &str, native_tab: &TransTab) -> Option<EventMask> {
    if let Some(code) = GENEV_TRANSTAB.to_code(name) {
        return Some(EventMask::generic(code));
    }
    native_tab.to_code(name).map(EventMask::native)
}

/// Format an event mask as its generic and native name lists.
pub fn format_event(mask: &EventMask, native_tab: &TransTab) -> (String, String) {
    (
        GENEV_TRANSTAB.format(mask.generic),
        native_tab.format(mask.native),
    )
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
