//! Generic named-object table shared by every IPC family.
//!
//! Spec §3 ("Named object table"): each family maps a bounded name to an
//! object and an object-id back to the same entry, names are unique within
//! a family, and duplicate creation either returns the existing object
//! (default) or fails when an exclusive-creation flag is set. This module
//! factors that bookkeeping out of `mutex`/`semaphore`/`event`/`message`/`shm`,
//! the way the teacher's `ipc::shared_memory` hand-rolled the same `Vec`-scan
//! pattern (`SHARED_REGIONS.lock().iter().position(...)`) independently in
//! five places.

use crate::error::IpcError;
use crate::limits::MAX_NAME_LEN;
use alloc::vec::Vec;
use core::fmt;

/// A bounded, fixed-capacity object name (spec §3: at most 31 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ObjectName {
    bytes: [u8; MAX_NAME_LEN],
    len: u8,
}

impl ObjectName {
    /// Build a name from a `&str`, rejecting empty names and names over
    /// [`MAX_NAME_LEN`] bytes.
    pub fn new(name: &str) -> Result<Self, IpcError> {
        let raw = name.as_bytes();
        if raw.is_empty() || raw.len() > MAX_NAME_LEN {
            return Err(IpcError::InvalidArg);
        }
        let mut bytes = [0u8; MAX_NAME_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(ObjectName { bytes, len: raw.len() as u8 })
    }

    /// Borrow the name as a `&str`.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("???")
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single entry in a [`Registry`]: an id, its name, and the family object.
struct Entry<T> {
    id: u32,
    name: ObjectName,
    object: T,
}

/// How `Registry::create` should behave when the name already exists.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CreatePolicy {
    /// Return the existing object's id (spec default for every family but
    /// shared memory's `EXCL` flag).
    ReturnExisting,
    /// Fail with [`IpcError::Exists`] (shared memory's `EXCL` flag).
    Exclusive,
}

/// Generic name→object / id→object table. Owned by each family; never
/// shared directly across families (spec §5: "No cross-family locks are
/// ever held simultaneously").
pub struct Registry<T> {
    entries: Vec<Entry<T>>,
    next_id: u32,
    /// Lifetime count of entries actually built by `create` (not bumped on
    /// a `ReturnExisting` hit), for the supervisor's leak heuristic (spec
    /// §4.7: "created − destroyed > 100").
    created_total: u64,
    /// Lifetime count of entries removed via `remove`.
    destroyed_total: u64,
}

impl<T> Registry<T> {
    pub const fn new() -> Self {
        Registry { entries: Vec::new(), next_id: 1, created_total: 0, destroyed_total: 0 }
    }

    /// Lifetime count of objects this registry has ever built.
    pub fn created_total(&self) -> u64 {
        self.created_total
    }

    /// Lifetime count of objects this registry has ever removed.
    pub fn destroyed_total(&self) -> u64 {
        self.destroyed_total
    }

    /// Look up an existing object by name, returning its id.
    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.entries.iter().find(|e| e.name.as_str() == name).map(|e| e.id)
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.object)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.entries.iter_mut().find(|e| e.id == id).map(|e| &mut e.object)
    }

    /// Insert a freshly built object under `name`, or — per `policy` — return
    /// the id of an existing entry with the same name.
    ///
    /// `build` is only invoked when a new entry is actually created, so
    /// callers can defer expensive allocation (physical frames, etc.) until
    /// it's known to be needed.
    pub fn create(
        &mut self,
        name: &str,
        policy: CreatePolicy,
        build: impl FnOnce(u32) -> Result<T, IpcError>,
    ) -> Result<(u32, bool), IpcError> {
        let object_name = ObjectName::new(name)?;
        if let Some(id) = self.find_by_name(name) {
            return match policy {
                CreatePolicy::ReturnExisting => Ok((id, false)),
                CreatePolicy::Exclusive => Err(IpcError::Exists),
            };
        }
        let id = self.next_id;
        let object = build(id)?;
        self.entries.push(Entry { id, name: object_name, object });
        self.next_id += 1;
        self.created_total += 1;
        Ok((id, true))
    }

    /// Remove an entry unconditionally, returning its object.
    pub fn remove(&mut self, id: u32) -> Option<T> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        self.destroyed_total += 1;
        Some(self.entries.remove(pos).object)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str, &T)> {
        self.entries.iter().map(|e| (e.id, e.name.as_str(), &e.object))
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(u32, &mut T)) {
        for e in self.entries.iter_mut() {
            f(e.id, &mut e.object);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
