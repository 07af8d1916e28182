// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Machine trap handling: trap frame save/restore, `ecall` decode and the
//! handoff to the supervisor payload.

use crate::{
    STACK_SIZE_PER_HART, hart,
    platform::{Platform, PlatformImpl},
    services::Services,
};
use core::arch::{asm, global_asm};

/// Load address of the supervisor payload.
const PAYLOAD_ADDR: usize = 0x8020_0000;

/// Environment call from S-mode.
const ECALL_FROM_SMODE: usize = 9;

const MSTATUS_MPP_MASK: usize = 3 << 11;
const MSTATUS_MPP_S: usize = 1 << 11;

/// Exceptions the supervisor handles itself: misaligned fetch, breakpoint,
/// ecall from U-mode and page faults.
const MEDELEG_VALUE: usize = 1 << 0 | 1 << 3 | 1 << 8 | 1 << 12 | 1 << 13 | 1 << 15;
/// Interrupts delegated to S-mode: supervisor software, timer and external.
const MIDELEG_VALUE: usize = 1 << 1 | 1 << 5 | 1 << 9;

/// The general purpose registers saved on trap entry. Slot `i` holds `x_i`;
/// slot 0 is unused and slot 2 holds the trapped context's stack pointer.
#[repr(C)]
struct TrapFrame {
    regs: [usize; 32],
}

unsafe extern "C" {
    fn trap_entry();
    static __stacks_top: [u8; 0];
}

/// Installs the trap vector and this hart's machine trap stack.
pub fn init() {
    let hart_index = PlatformImpl::hart_index(hart::current_hart_id());
    // SAFETY: `__stacks_top` is only used for its address, which the linker
    // script defines.
    let stacks_top = unsafe { (&raw const __stacks_top) as usize };
    let trap_stack = stacks_top - hart_index * STACK_SIZE_PER_HART;
    // SAFETY: `trap_entry` is 4-byte aligned and `trap_stack` points at the
    // top of this hart's dedicated stack slot.
    unsafe {
        asm!(
            "csrw mscratch, {stack}",
            "csrw mtvec, {vector}",
            "csrw medeleg, {medeleg}",
            "csrw mideleg, {mideleg}",
            stack = in(reg) trap_stack,
            vector = in(reg) trap_entry as usize,
            medeleg = in(reg) MEDELEG_VALUE,
            mideleg = in(reg) MIDELEG_VALUE,
            options(nomem, nostack),
        )
    };
}

/// Drops to S-mode and enters the supervisor payload, never to return.
pub fn enter_supervisor(hart_id: usize, fdt_addr: usize) -> ! {
    // SAFETY: The payload is loaded at PAYLOAD_ADDR by the machine model and
    // expects the hart id and device tree address in a0 and a1.
    unsafe {
        asm!(
            "csrc mstatus, {mpp_mask}",
            "csrs mstatus, {mpp_s}",
            "csrw mepc, {entry}",
            "mret",
            mpp_mask = in(reg) MSTATUS_MPP_MASK,
            mpp_s = in(reg) MSTATUS_MPP_S,
            entry = in(reg) PAYLOAD_ADDR,
            in("a0") hart_id,
            in("a1") fdt_addr,
            options(noreturn),
        )
    }
}

extern "C" fn handle_trap(frame: &mut TrapFrame) {
    let mcause: usize;
    let mepc: usize;
    // SAFETY: Reading trap cause CSRs has no side effects.
    unsafe {
        asm!(
            "csrr {mcause}, mcause",
            "csrr {mepc}, mepc",
            mcause = out(reg) mcause,
            mepc = out(reg) mepc,
            options(nomem, nostack),
        )
    };

    if mcause == ECALL_FROM_SMODE {
        let args = [
            frame.regs[10],
            frame.regs[11],
            frame.regs[12],
            frame.regs[13],
            frame.regs[14],
            frame.regs[15],
        ];
        let ret = Services::get().handle_ecall(frame.regs[17], frame.regs[16], &args);
        frame.regs[10] = ret.error as usize;
        frame.regs[11] = ret.value;
        // SAFETY: Skipping the 4-byte ecall instruction resumes the
        // supervisor at the next one.
        unsafe {
            asm!(
                "csrw mepc, {mepc}",
                mepc = in(reg) mepc + 4,
                options(nomem, nostack),
            )
        };
    } else {
        panic!("unhandled trap: mcause {mcause:#x} at {mepc:#x}");
    }
}

global_asm!(
    r#"
    .section .text
    .align 4
    .globl trap_entry
    trap_entry:
        /* sp <- machine trap stack, mscratch <- trapped sp. */
        csrrw sp, mscratch, sp
        addi sp, sp, -8 * 32
        sd x1, 1 * 8(sp)
        sd x3, 3 * 8(sp)
        sd x4, 4 * 8(sp)
        sd x5, 5 * 8(sp)
        sd x6, 6 * 8(sp)
        sd x7, 7 * 8(sp)
        sd x8, 8 * 8(sp)
        sd x9, 9 * 8(sp)
        sd x10, 10 * 8(sp)
        sd x11, 11 * 8(sp)
        sd x12, 12 * 8(sp)
        sd x13, 13 * 8(sp)
        sd x14, 14 * 8(sp)
        sd x15, 15 * 8(sp)
        sd x16, 16 * 8(sp)
        sd x17, 17 * 8(sp)
        sd x18, 18 * 8(sp)
        sd x19, 19 * 8(sp)
        sd x20, 20 * 8(sp)
        sd x21, 21 * 8(sp)
        sd x22, 22 * 8(sp)
        sd x23, 23 * 8(sp)
        sd x24, 24 * 8(sp)
        sd x25, 25 * 8(sp)
        sd x26, 26 * 8(sp)
        sd x27, 27 * 8(sp)
        sd x28, 28 * 8(sp)
        sd x29, 29 * 8(sp)
        sd x30, 30 * 8(sp)
        sd x31, 31 * 8(sp)
        csrr t0, mscratch
        sd t0, 2 * 8(sp)

        mv a0, sp
        call {handler}

        ld x1, 1 * 8(sp)
        ld x3, 3 * 8(sp)
        ld x4, 4 * 8(sp)
        ld x5, 5 * 8(sp)
        ld x6, 6 * 8(sp)
        ld x7, 7 * 8(sp)
        ld x8, 8 * 8(sp)
        ld x9, 9 * 8(sp)
        ld x10, 10 * 8(sp)
        ld x11, 11 * 8(sp)
        ld x12, 12 * 8(sp)
        ld x13, 13 * 8(sp)
        ld x14, 14 * 8(sp)
        ld x15, 15 * 8(sp)
        ld x16, 16 * 8(sp)
        ld x17, 17 * 8(sp)
        ld x18, 18 * 8(sp)
        ld x19, 19 * 8(sp)
        ld x20, 20 * 8(sp)
        ld x21, 21 * 8(sp)
        ld x22, 22 * 8(sp)
        ld x23, 23 * 8(sp)
        ld x24, 24 * 8(sp)
        ld x25, 25 * 8(sp)
        ld x26, 26 * 8(sp)
        ld x27, 27 * 8(sp)
        ld x28, 28 * 8(sp)
        ld x29, 29 * 8(sp)
        ld x30, 30 * 8(sp)
        ld x31, 31 * 8(sp)
        addi sp, sp, 8 * 32
        /* sp <- trapped sp, mscratch <- machine trap stack. */
        csrrw sp, mscratch, sp
        mret
    "#,
    handler = sym handle_trap,
);
