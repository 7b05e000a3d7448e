//! Memory-manager contract (spec §6), consumed only by [`crate::shm`].
//!
//! Grounded in the teacher's `memory::address::{PhysAddr, VirtAddr}` newtypes
//! and `memory::physical`/`memory::virtual_mem` free functions, generalized
//! to a trait so this crate never links a specific physical allocator or
//! page-table walker — per spec §1, the physical memory manager is an
//! out-of-scope external collaborator.

/// A physical page-frame address. Opaque beyond equality/ordering: this
/// crate never dereferences one directly, only hands it to [`MemoryManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

/// A virtual address within some task's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

/// Mapping permission bits, a subset of a shared region's maximum grantable
/// mask (spec §4.6: "Permissions are the *maximum* grantable mask").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

impl Permissions {
    pub const READ_WRITE: Permissions = Permissions { read: true, write: true, exec: false };
    pub const READ_ONLY: Permissions = Permissions { read: true, write: false, exec: false };

    /// `true` if `self` requests nothing `max` does not already grant.
    pub const fn is_subset_of(self, max: Permissions) -> bool {
        (!self.read || max.read) && (!self.write || max.write) && (!self.exec || max.exec)
    }
}

/// Narrow physical-memory-manager contract consumed by the shared-memory
/// family.
pub trait MemoryManager: Sync {
    /// Allocate `n` contiguous (or at least individually trackable) physical
    /// page frames. Returns the base address, or `None` on exhaustion.
    fn alloc_pages(&self, n: usize) -> Option<PhysAddr>;

    /// Map `n` pages starting at `phys` into `pid`'s address space, at
    /// `hint` (0 = let the implementation choose) with `perms`. Returns the
    /// virtual address the mapping landed at.
    fn map(
        &self,
        pid: crate::sched::Pid,
        hint: VirtAddr,
        phys: PhysAddr,
        n: usize,
        perms: Permissions,
    ) -> Option<VirtAddr>;

    /// Remove `n` pages' worth of mapping starting at `virt` from `pid`'s
    /// address space.
    fn unmap(&self, pid: crate::sched::Pid, virt: VirtAddr, n: usize);

    /// Return `n` physical pages starting at `phys` to the free pool.
    fn free_pages(&self, phys: PhysAddr, n: usize);

    /// Change an existing `old_n`-page allocation at `old_phys` to `new_n`
    /// pages (`new_n > old_n`), relocating if the implementation cannot
    /// extend it in place. Returns the (possibly new) base address, or
    /// `None` on exhaustion; on success the caller owns exactly `new_n`
    /// pages at the returned address and must treat `old_phys` as freed.
    /// Mirrors the teacher's `memory::heap::grow_heap`, which likewise
    /// either extends the existing commitment or, when it can't, falls back
    /// to allocating fresh backing and leaves relocation to the caller.
    fn realloc_pages(&self, old_phys: PhysAddr, old_n: usize, new_n: usize) -> Option<PhysAddr>;

    /// Page size in bytes, used to round requested sizes up (spec §4.6).
    fn page_size(&self) -> usize {
        4096
    }
}
