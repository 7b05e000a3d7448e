//! Named, reference-counted shared-memory regions (spec §4.6).
//!
//! Grounded in the teacher's `ipc::shared_memory` module: the same
//! "allocate physical frames, map into a process's address space, track
//! `{pid, vaddr}` mappings, free frames only when the last reference and
//! the last mapping are both gone" shape, and the same staged-locking
//! discipline it uses in `cleanup_process` (collect work under the region
//! lock, do the expensive unmap/free outside it) — generalized off the
//! teacher's hard-coded `memory::physical`/`memory::virtual_mem` calls onto
//! the [`crate::mm::MemoryManager`] contract, and restructured around named
//! handles (`create`/EXCL) rather than bare numeric region ids minted by a
//! syscall layer.

use alloc::vec::Vec;

use crate::error::{IpcError, Result};
use crate::mm::{MemoryManager, PhysAddr, Permissions, VirtAddr};
use crate::registry::{CreatePolicy, Registry};
use crate::sched::Pid;
use crate::stats::Stats;
use crate::sync::spinlock::Spinlock;

bitflags::bitflags! {
    /// Shared-memory creation flags (spec §4.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShmFlags: u8 {
        /// Fail with `Exists` instead of returning the existing region.
        const EXCL = 0b0001;
    }
}

struct Mapping {
    pid: Pid,
    virt: VirtAddr,
    pages: usize,
    perms: Permissions,
}

struct RegionState {
    phys: PhysAddr,
    pages: usize,
    max_perms: Permissions,
    /// Number of outstanding `create()` handles not yet matched by `destroy`.
    refcount: u32,
    dying: bool,
    mappings: Vec<Mapping>,
}

/// One named shared-memory region, as held by [`ShmTable`].
pub struct SharedRegion {
    state: Spinlock<RegionState>,
}

/// The shared-memory family's table.
pub struct ShmTable {
    registry: Spinlock<Registry<SharedRegion>>,
}

impl ShmTable {
    pub const fn new() -> Self {
        ShmTable { registry: Spinlock::new(Registry::new()) }
    }

    /// `create(name, size, perms, flags)`.
    pub fn create(
        &self,
        name: &str,
        size: usize,
        max_perms: Permissions,
        flags: ShmFlags,
        mm: &dyn MemoryManager,
        stats: &Stats,
    ) -> Result<u32> {
        let policy =
            if flags.contains(ShmFlags::EXCL) { CreatePolicy::Exclusive } else { CreatePolicy::ReturnExisting };
        let mut reg = self.registry.lock();
        let existed = reg.find_by_name(name).is_some();
        let (id, created) = reg.create(name, policy, |_id| {
            let page_size = mm.page_size();
            let pages = size.div_ceil(page_size).max(1);
            let phys = mm.alloc_pages(pages).ok_or(IpcError::NoMem)?;
            Ok(SharedRegion {
                state: Spinlock::new(RegionState {
                    phys,
                    pages,
                    max_perms,
                    refcount: 1,
                    dying: false,
                    mappings: Vec::new(),
                }),
            })
        })?;
        if created {
            Stats::inc(&stats.shm_regions_created);
            log::trace!("[SHM] create id={id} name={name} size={size}");
        } else if existed {
            reg.get(id).unwrap().state.lock().refcount += 1;
        }
        Ok(id)
    }

    /// `map(region, hint, perms)`: `perms` must be a subset of the region's
    /// max grantable mask.
    pub fn map(
        &self,
        id: u32,
        pid: Pid,
        hint: VirtAddr,
        perms: Permissions,
        mm: &dyn MemoryManager,
    ) -> Result<VirtAddr> {
        let reg = self.registry.lock();
        let region = reg.get(id).ok_or(IpcError::NotFound)?;
        let mut state = region.state.lock();
        if !perms.is_subset_of(state.max_perms) {
            return Err(IpcError::Denied);
        }
        let virt = mm
            .map(pid, hint, state.phys, state.pages, perms)
            .ok_or(IpcError::NoMem)?;
        state.mappings.push(Mapping { pid, virt, pages: state.pages, perms });
        Ok(virt)
    }

    /// `unmap(addr, size)`: tears down the mapping; completes a deferred
    /// destroy if this was the last reference and the last mapping.
    pub fn unmap(&self, id: u32, pid: Pid, virt: VirtAddr, mm: &dyn MemoryManager) -> Result<()> {
        let mut reg = self.registry.lock();
        let reclaim = {
            let region = reg.get(id).ok_or(IpcError::NotFound)?;
            let mut state = region.state.lock();
            let pos = state
                .mappings
                .iter()
                .position(|m| m.pid == pid && m.virt == virt)
                .ok_or(IpcError::NotFound)?;
            let mapping = state.mappings.remove(pos);
            mm.unmap(pid, mapping.virt, mapping.pages);
            state.dying && state.refcount == 0 && state.mappings.is_empty()
        };
        if reclaim {
            self.reclaim(&mut reg, id, mm);
        }
        Ok(())
    }

    /// `resize(region, new_size)`: requires at most one active mapping.
    pub fn resize(&self, id: u32, new_size: usize, mm: &dyn MemoryManager) -> Result<()> {
        let reg = self.registry.lock();
        let region = reg.get(id).ok_or(IpcError::NotFound)?;
        let mut state = region.state.lock();
        if state.mappings.len() > 1 {
            return Err(IpcError::Busy);
        }
        let page_size = mm.page_size();
        let new_pages = new_size.div_ceil(page_size).max(1);
        if new_pages == state.pages {
            return Ok(());
        }
        if new_pages > state.pages {
            let new_phys = mm.realloc_pages(state.phys, state.pages, new_pages).ok_or(IpcError::NoMem)?;
            if new_phys != state.phys {
                // At most one mapping can exist here (checked above); remap it onto
                // the relocated frames before the old ones are considered gone.
                if let Some(mapping) = state.mappings.first() {
                    let (pid, virt, perms) = (mapping.pid, mapping.virt, mapping.perms);
                    mm.unmap(pid, virt, mapping.pages);
                    let new_virt = mm.map(pid, virt, new_phys, new_pages, perms).ok_or(IpcError::NoMem)?;
                    state.mappings[0].virt = new_virt;
                }
                state.phys = new_phys;
            }
        } else {
            mm.free_pages(
                PhysAddr(state.phys.0 + (new_pages as u64) * page_size as u64),
                state.pages - new_pages,
            );
        }
        state.pages = new_pages;
        if let Some(mapping) = state.mappings.first_mut() {
            mapping.pages = new_pages;
        }
        Ok(())
    }

    /// `destroy`: marks the region dying; if `refcount` is already zero and
    /// no mappings remain, reclaims immediately, otherwise defers to the
    /// last `unmap`.
    pub fn destroy(&self, id: u32, mm: &dyn MemoryManager) -> Result<()> {
        let mut reg = self.registry.lock();
        let reclaim = {
            let region = reg.get(id).ok_or(IpcError::NotFound)?;
            let mut state = region.state.lock();
            state.refcount = state.refcount.saturating_sub(1);
            state.dying = true;
            state.refcount == 0 && state.mappings.is_empty()
        };
        if reclaim {
            self.reclaim(&mut reg, id, mm);
        }
        Ok(())
    }

    fn reclaim(&self, reg: &mut Registry<SharedRegion>, id: u32, mm: &dyn MemoryManager) {
        if let Some(region) = reg.remove(id) {
            let state = region.state.lock();
            mm.free_pages(state.phys, state.pages);
            log::debug!("[SHM] reclaim id={id} pages={}", state.pages);
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.registry.lock().find_by_name(name)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn created_destroyed_totals(&self) -> (u64, u64) {
        let reg = self.registry.lock();
        (reg.created_total(), reg.destroyed_total())
    }

    pub fn list(&self) -> Vec<(u32, alloc::string::String)> {
        self.registry
            .lock()
            .iter()
            .map(|(id, name, _obj)| (id, alloc::string::String::from(name)))
            .collect()
    }

    /// Task-death cleanup (spec §4.7, shared-memory step): unmap every
    /// mapping owned by `pid` and reclaim the region if that was the last
    /// reference, mirroring the teacher's staged `cleanup_process`.
    pub fn cleanup_task(&self, pid: Pid, mm: &dyn MemoryManager) {
        log::debug!("[SHM] cleanup walk pid={pid}");
        let mut reg = self.registry.lock();
        let mut to_reclaim = Vec::new();
        reg.for_each_mut(|id, region: &mut SharedRegion| {
            let mut state = region.state.lock();
            let doomed: Vec<Mapping> = {
                let mut kept = Vec::new();
                let mut removed = Vec::new();
                for m in state.mappings.drain(..) {
                    if m.pid == pid {
                        removed.push(m);
                    } else {
                        kept.push(m);
                    }
                }
                state.mappings = kept;
                removed
            };
            for m in &doomed {
                mm.unmap(m.pid, m.virt, m.pages);
            }
            if state.dying && state.refcount == 0 && state.mappings.is_empty() {
                to_reclaim.push(id);
            }
        });
        for id in to_reclaim {
            self.reclaim(&mut reg, id, mm);
        }
    }
}

impl Default for ShmTable {
    fn default() -> Self {
        Self::new()
    }
}
