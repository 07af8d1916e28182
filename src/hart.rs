// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Per-hart state plumbing.

use crate::{
    csr,
    platform::{Platform, PlatformImpl},
};
use core::cell::RefCell;
use percore::{Cores, ExceptionLock, PerCore};

/// Returns the hardware thread id of the calling hart.
pub fn current_hart_id() -> usize {
    csr::read_mhartid()
}

/// Implementation of the `Cores` trait to get the index of the current hart.
pub struct HartsImpl;

// SAFETY: `hart_index` maps every valid hart id to a distinct index below
// `HART_COUNT`, and `mhartid` is fixed for the lifetime of a hart.
unsafe impl Cores for HartsImpl {
    fn core_index() -> usize {
        PlatformImpl::hart_index(current_hart_id())
    }
}

/// Mutable state partitioned per hart, indexed by the calling hart.
pub type PerHartState<T> =
    PerCore<[ExceptionLock<RefCell<T>>; PlatformImpl::HART_COUNT], HartsImpl>;

/// Runs `f` with machine interrupts masked on the calling hart.
#[cfg(all(target_arch = "riscv64", not(test)))]
pub fn exception_free<T>(f: impl FnOnce(percore::ExceptionFree) -> T) -> T {
    let prev = csr::mask_interrupts();
    // SAFETY: Machine interrupts are masked and this firmware never takes a
    // higher-privilege trap, so nothing can preempt the critical section.
    let token = unsafe { percore::ExceptionFree::new() };
    let result = f(token);
    csr::restore_interrupts(prev);
    result
}
