// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Rusted SBI: machine-mode SBI firmware with counter virtualization for
//! RISC-V.

#![cfg_attr(not(test), no_main)]
#![cfg_attr(not(test), no_std)]

mod csr;
mod debug;
mod hart;
mod logger;
mod platform;
mod pmu;
mod sbi;
mod services;
#[cfg(all(target_arch = "riscv64", not(test)))]
mod trap;

use crate::{
    platform::{Platform, PlatformImpl},
    services::Services,
};
use core::sync::atomic::{AtomicBool, Ordering};
use log::info;

/// Size of each hart's boot and trap stack. Keep in sync with the stack
/// block in `firmware.ld`.
pub const STACK_SIZE_PER_HART: usize = 0x4000;

/// Set once the boot hart has finished cold boot initialisation.
static COLD_BOOT_DONE: AtomicBool = AtomicBool::new(false);

/// Rust entry point, called from the assembly stub with this hart's id and
/// the device tree address handed over by the previous boot stage.
#[cfg_attr(test, allow(unused))]
extern "C" fn fw_main(hart_id: usize, fdt_addr: usize) -> ! {
    let cold_boot = PlatformImpl::hart_index(hart_id) == 0;
    if cold_boot {
        PlatformImpl::init();
        info!("Rusted SBI starting on hart {hart_id}, device tree at {fdt_addr:#x}");
    } else {
        // Secondary harts wait until the boot hart has fixed the counter
        // topology and registered the platform's events.
        while !COLD_BOOT_DONE.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }

    let services = Services::get();
    services
        .pmu
        .counters
        .init(cold_boot)
        .expect("PMU init failed");

    if cold_boot {
        info!(
            "{} counters available",
            services.pmu.counters.num_counters()
        );
        COLD_BOOT_DONE.store(true, Ordering::Release);
    }

    #[cfg(all(target_arch = "riscv64", not(test)))]
    {
        trap::init();
        trap::enter_supervisor(hart_id, fdt_addr);
    }
    #[cfg(any(not(target_arch = "riscv64"), test))]
    unreachable!();
}

#[cfg(all(target_arch = "riscv64", not(test)))]
mod entry {
    use core::arch::global_asm;

    global_asm!(
        r#"
        .section .text._start
        .globl _start
        _start:
            csrw mie, zero

            /* Only the boot hart clears .bss. */
            csrr t0, mhartid
            bnez t0, 1f
            la t1, __bss_start
            la t2, __bss_end
        0:  bgeu t1, t2, 1f
            sd zero, 0(t1)
            addi t1, t1, 8
            j 0b

        1:  /* Each hart gets its own slot below __stacks_top. */
            la t1, __stacks_top
            li t2, {stack_size}
            mul t2, t2, t0
            sub sp, t1, t2

            mv a0, t0
            /* a1 already holds the device tree address. */
            call {fw_main}
        "#,
        stack_size = const super::STACK_SIZE_PER_HART,
        fw_main = sym super::fw_main,
    );
}
