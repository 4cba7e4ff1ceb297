//! Maps code addresses to source positions.
//!
//! # how it works
//! The compiler writes a debug-info file for every piece of code it emits
//! (see [`parse`] for the format). Loading a file parses it and publishes a
//! new snapshot holding its units next to the ones loaded before. Each file
//! is read at most once, and a unit that is already published is never
//! added again. Lookups only ever read the current snapshot, so they never
//! lock.
//!
//! Nothing here fails loudly. A missing or broken file leaves the table empty
//! and every lookup answers "unknown". Backtrace quality must never be the
//! reason a program cannot terminate.

mod parse;
pub mod write;


use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bitflags::bitflags;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::slot::Backend;

bitflags! {
    /// Per-event flags as stored in the file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventFlags: u8 {
        /// The event is a raise instruction, not a call.
        const RAISE = 1 << 0;
        /// The event's function was inlined into its caller.
        const INLINED = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: Arc<str>,
    pub line: u32,
    pub start_char: u32,
    pub end_char: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEvent {
    /// Relative to the base of the code unit.
    pub offset: usize,
    pub defname: Arc<str>,
    /// `None` for compiler-generated code without a source position.
    pub pos: Option<SourcePos>,
    pub flags: EventFlags,
}

/// Debug events of one contiguous range of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    pub name: Box<str>,
    pub backend: Backend,
    pub base: usize,
    pub size: usize,
    /// Sorted by offset.
    pub events: Box<[DebugEvent]>,
}

impl CodeUnit {
    fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    fn event_at(&self, addr: usize) -> Option<&DebugEvent> {
        let offset = addr.checked_sub(self.base)?;
        let idx = self
            .events
            .binary_search_by_key(&offset, |e| e.offset)
            .ok()?;
        Some(&self.events[idx])
    }
}

/// Outcome of loading a debug-info table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugInfoStatus {
    /// Nobody asked for debug info yet.
    NotLoaded,
    /// Loaded without a path: no debug info was requested.
    NoPath,
    Loaded,
    FileNotFound,
    /// The file exists but could not be read.
    Unreadable,
    Malformed,
}

/// What readers see: the units published so far and the outcome of the
/// latest load.
#[derive(Debug)]
struct Snapshot {
    status: DebugInfoStatus,
    /// Sorted by base, non-overlapping.
    units: Arc<[CodeUnit]>,
}

fn read_units(path: &Path) -> Result<Vec<CodeUnit>, DebugInfoStatus> {
    match std::fs::read(path) {
        Ok(data) => parse_units(&data),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "debug info file not found");
            Err(DebugInfoStatus::FileNotFound)
        }
        Err(err) => {
            warn!(path = %path.display(), "cannot read debug info: {err}");
            Err(DebugInfoStatus::Unreadable)
        }
    }
}

fn parse_units(data: &[u8]) -> Result<Vec<CodeUnit>, DebugInfoStatus> {
    parse::parse_debug_info(data).map_err(|err| {
        warn!("ignoring malformed debug info: {err}");
        DebugInfoStatus::Malformed
    })
}

fn overlaps(a: &CodeUnit, b: &CodeUnit) -> bool {
    a.base < b.base.saturating_add(b.size) && b.base < a.base.saturating_add(a.size)
}

/// Debug info of one program image. Every code unit is loaded at most once.
///
/// Loads are serialized and publish a new snapshot when they are done.
/// Lookups read whatever snapshot is current and never wait for a load.
#[derive(Debug)]
pub struct DebugInfoTable {
    snapshot: ArcSwap<Snapshot>,
    /// Files loaded so far and what came of them. Held for the whole load.
    loads: Mutex<HashMap<PathBuf, DebugInfoStatus>>,
}

static GLOBAL: Lazy<DebugInfoTable> = Lazy::new(DebugInfoTable::new);

impl Default for DebugInfoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugInfoTable {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot {
                status: DebugInfoStatus::NotLoaded,
                units: Arc::from(Vec::new()),
            }),
            loads: Mutex::new(HashMap::new()),
        }
    }

    /// The table of the running program.
    pub fn global() -> &'static DebugInfoTable {
        &GLOBAL
    }

    /// Loads the file at `path` unless it was loaded before, in which case
    /// the status of that first load is returned and the disk is not touched.
    /// Concurrent callers loading the same file wait for the first one.
    #[instrument(skip_all, fields(path = ?path))]
    pub fn load(&self, path: Option<&Path>) -> DebugInfoStatus {
        let mut loads = self.loads.lock();
        let Some(path) = path else {
            if self.status() == DebugInfoStatus::NotLoaded {
                self.publish(DebugInfoStatus::NoPath, None);
            }
            return DebugInfoStatus::NoPath;
        };
        if let Some(&status) = loads.get(path) {
            debug!(?status, "debug info already loaded");
            return status;
        }

        let status = match read_units(path) {
            Ok(units) => self.publish(DebugInfoStatus::Loaded, Some(units)),
            Err(status) => self.publish(status, None),
        };
        loads.insert(path.to_owned(), status);
        status
    }

    /// Like [`load`](Self::load), for debug info that is already in memory.
    /// Units that were loaded before are skipped.
    pub fn load_bytes(&self, data: &[u8]) -> DebugInfoStatus {
        let _loads = self.loads.lock();
        match parse_units(data) {
            Ok(units) => self.publish(DebugInfoStatus::Loaded, Some(units)),
            Err(status) => self.publish(status, None),
        }
    }

    /// Merges `units` into the published ones. Caller holds `loads`.
    fn publish(&self, status: DebugInfoStatus, units: Option<Vec<CodeUnit>>) -> DebugInfoStatus {
        let current = self.snapshot.load_full();
        let units = match units {
            None => current.units.clone(),
            Some(new) => {
                let mut merged = current.units.to_vec();
                for unit in new {
                    if let Some(old) = merged.iter().find(|old| overlaps(old, &unit)) {
                        if *old == unit {
                            debug!(name = %unit.name, "code unit already loaded");
                        } else {
                            warn!(
                                name = %unit.name,
                                base = unit.base,
                                "code unit overlaps loaded unit {}, skipping it",
                                old.name
                            );
                        }
                        continue;
                    }
                    merged.push(unit);
                }
                merged.sort_by_key(|u| u.base);
                merged.into()
            }
        };
        self.snapshot.store(Arc::new(Snapshot { status, units }));
        status
    }

    /// Outcome of the latest load.
    pub fn status(&self) -> DebugInfoStatus {
        self.snapshot.load().status
    }

    /// Whether any addresses can be resolved at all.
    pub fn is_available(&self) -> bool {
        !self.snapshot.load().units.is_empty()
    }

    /// The units published so far, sorted by base.
    pub fn units(&self) -> Arc<[CodeUnit]> {
        self.snapshot.load().units.clone()
    }

    /// The event recorded for exactly `addr`, if `addr` is inside a unit of
    /// `backend`.
    pub fn lookup(&self, backend: Backend, addr: usize) -> Option<DebugEvent> {
        let snapshot = self.snapshot.load();
        let units = &snapshot.units;
        let idx = units.partition_point(|u| u.base <= addr);
        let unit = &units[idx.checked_sub(1)?];
        if !unit.contains(addr) || unit.backend != backend {
            return None;
        }
        unit.event_at(addr).cloned()
    }
}
