//! Narrow hardware/platform contract used only by [`crate::sync::spinlock`].
//!
//! The teacher kernel's spinlock calls straight into `arch::hal::{cpu_id,
//! disable_interrupts, enable_interrupts}`, which are `cfg`-gated free
//! functions wired to a specific architecture. That is fine for a bootable
//! kernel with exactly one HAL, but this crate is a portable library, so the
//! same contract is expressed as the `critical_section` crate — the
//! ecosystem-standard way for a `no_std` crate to ask its embedder "give me
//! a global critical section" without linking to any particular
//! architecture. The host kernel provides an implementation once via
//! `critical_section::set_impl!`; under the `std` test feature this crate's
//! `cfg(test)` code relies on `critical_section`'s own std-based default.
