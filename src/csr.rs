// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Machine-mode CSR access for the counter subsystem.
//!
//! RISC-V CSR instructions encode the CSR address as an immediate, so access
//! to a counter selected at runtime has to dispatch to a constant. Under
//! `cfg(test)` the whole register file is faked so the counter state machine
//! can be exercised on the host.

/// Unprivileged counter CSR base address (`cycle`).
pub const CSR_CYCLE: u16 = 0xC00;

/// Set when the native word cannot hold a full 64-bit counter, in which case
/// counter accesses go through the low/high CSR pair.
pub const SPLIT_COUNTER_ACCESS: bool = usize::BITS < u64::BITS;

/// A per-counter bitset held in a CSR word (`mcounteren`/`mcountinhibit`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct CounterBits(pub usize);

impl CounterBits {
    /// Returns whether the bit for counter `idx` is set.
    pub fn test(self, idx: usize) -> bool {
        self.0 & 1 << idx != 0
    }

    /// Sets the bit for counter `idx`.
    pub fn set(&mut self, idx: usize) {
        self.0 |= 1 << idx;
    }

    /// Clears the bit for counter `idx`.
    pub fn clear(&mut self, idx: usize) {
        self.0 &= !(1 << idx);
    }
}

/// Reads `mcounteren`.
pub fn read_mcounteren() -> CounterBits {
    CounterBits(imp::read_mcounteren())
}

/// Writes `mcounteren`.
pub fn write_mcounteren(bits: CounterBits) {
    imp::write_mcounteren(bits.0);
}

/// Reads `mcountinhibit`.
pub fn read_mcountinhibit() -> CounterBits {
    CounterBits(imp::read_mcountinhibit())
}

/// Writes `mcountinhibit`.
pub fn write_mcountinhibit(bits: CounterBits) {
    imp::write_mcountinhibit(bits.0);
}

/// Reads the full width of the hardware counter at `idx`.
pub fn read_counter(idx: usize) -> u64 {
    if SPLIT_COUNTER_ACCESS {
        let lo = imp::read_counter_word(idx) as u64;
        let hi = imp::read_counter_high_word(idx) as u64;
        hi << 32 | lo
    } else {
        imp::read_counter_word(idx) as u64
    }
}

/// Writes the full width of the hardware counter at `idx`.
pub fn write_counter(idx: usize, value: u64) {
    imp::write_counter_word(idx, value as usize);
    if SPLIT_COUNTER_ACCESS {
        imp::write_counter_high_word(idx, (value >> 32) as usize);
    }
}

/// Programs the event selector for the counter at `idx`.
///
/// Only counters 3 and up have a selector register.
pub fn write_mhpmevent(idx: usize, value: usize) {
    debug_assert!(idx >= 3);
    imp::write_mhpmevent(idx, value);
}

/// Reads `mhartid`.
pub fn read_mhartid() -> usize {
    imp::read_mhartid()
}

/// Reads `mvendorid`.
pub fn read_mvendorid() -> usize {
    imp::read_mvendorid()
}

/// Reads `marchid`.
pub fn read_marchid() -> usize {
    imp::read_marchid()
}

/// Reads `mimpid`.
pub fn read_mimpid() -> usize {
    imp::read_mimpid()
}

#[cfg(all(target_arch = "riscv64", not(test)))]
pub use imp::{mask_interrupts, restore_interrupts};

#[cfg(all(target_arch = "riscv64", not(test)))]
mod imp {
    use core::arch::asm;

    const MCOUNTEREN: u32 = 0x306;
    const MCOUNTINHIBIT: u32 = 0x320;
    const MCYCLE: u32 = 0xB00;
    const MCYCLEH: u32 = 0xB80;
    // mhpmevent3 is 0x323, so indexing works from the same base as
    // mcountinhibit.
    const MHPMEVENT_BASE: u32 = 0x320;
    const MVENDORID: u32 = 0xF11;
    const MARCHID: u32 = 0xF12;
    const MIMPID: u32 = 0xF13;
    const MHARTID: u32 = 0xF14;

    const MSTATUS_MIE: usize = 1 << 3;

    macro_rules! csr_read {
        ($csr:expr) => {{
            let value: usize;
            // SAFETY: Reading a counter or id CSR has no side effects.
            unsafe {
                asm!(
                    "csrr {value}, {csr}",
                    value = out(reg) value,
                    csr = const $csr,
                    options(nomem, nostack),
                )
            };
            value
        }};
    }

    macro_rules! csr_write {
        ($csr:expr, $value:expr) => {{
            // SAFETY: The counter CSRs written here only affect the counter
            // subsystem this module owns.
            unsafe {
                asm!(
                    "csrw {csr}, {value}",
                    csr = const $csr,
                    value = in(reg) $value,
                    options(nomem, nostack),
                )
            };
        }};
    }

    /// Dispatches a per-counter CSR operation to the matching immediate CSR
    /// address.
    macro_rules! counter_csr_dispatch {
        ($idx:expr, $op:ident, $base:expr $(, $value:expr)?) => {
            match $idx {
                0 => $op!($base $(, $value)?),
                1 => $op!($base + 1 $(, $value)?),
                2 => $op!($base + 2 $(, $value)?),
                3 => $op!($base + 3 $(, $value)?),
                4 => $op!($base + 4 $(, $value)?),
                5 => $op!($base + 5 $(, $value)?),
                6 => $op!($base + 6 $(, $value)?),
                7 => $op!($base + 7 $(, $value)?),
                8 => $op!($base + 8 $(, $value)?),
                9 => $op!($base + 9 $(, $value)?),
                10 => $op!($base + 10 $(, $value)?),
                11 => $op!($base + 11 $(, $value)?),
                12 => $op!($base + 12 $(, $value)?),
                13 => $op!($base + 13 $(, $value)?),
                14 => $op!($base + 14 $(, $value)?),
                15 => $op!($base + 15 $(, $value)?),
                16 => $op!($base + 16 $(, $value)?),
                17 => $op!($base + 17 $(, $value)?),
                18 => $op!($base + 18 $(, $value)?),
                19 => $op!($base + 19 $(, $value)?),
                20 => $op!($base + 20 $(, $value)?),
                21 => $op!($base + 21 $(, $value)?),
                22 => $op!($base + 22 $(, $value)?),
                23 => $op!($base + 23 $(, $value)?),
                24 => $op!($base + 24 $(, $value)?),
                25 => $op!($base + 25 $(, $value)?),
                26 => $op!($base + 26 $(, $value)?),
                27 => $op!($base + 27 $(, $value)?),
                28 => $op!($base + 28 $(, $value)?),
                29 => $op!($base + 29 $(, $value)?),
                30 => $op!($base + 30 $(, $value)?),
                31 => $op!($base + 31 $(, $value)?),
                _ => unreachable!("counter index out of range"),
            }
        };
    }

    pub fn read_mcounteren() -> usize {
        csr_read!(MCOUNTEREN)
    }

    pub fn write_mcounteren(value: usize) {
        csr_write!(MCOUNTEREN, value);
    }

    pub fn read_mcountinhibit() -> usize {
        csr_read!(MCOUNTINHIBIT)
    }

    pub fn write_mcountinhibit(value: usize) {
        csr_write!(MCOUNTINHIBIT, value);
    }

    pub fn read_counter_word(idx: usize) -> usize {
        counter_csr_dispatch!(idx, csr_read, MCYCLE)
    }

    pub fn read_counter_high_word(idx: usize) -> usize {
        counter_csr_dispatch!(idx, csr_read, MCYCLEH)
    }

    pub fn write_counter_word(idx: usize, value: usize) {
        counter_csr_dispatch!(idx, csr_write, MCYCLE, value)
    }

    pub fn write_counter_high_word(idx: usize, value: usize) {
        counter_csr_dispatch!(idx, csr_write, MCYCLEH, value)
    }

    pub fn write_mhpmevent(idx: usize, value: usize) {
        counter_csr_dispatch!(idx, csr_write, MHPMEVENT_BASE, value)
    }

    pub fn read_mhartid() -> usize {
        csr_read!(MHARTID)
    }

    pub fn read_mvendorid() -> usize {
        csr_read!(MVENDORID)
    }

    pub fn read_marchid() -> usize {
        csr_read!(MARCHID)
    }

    pub fn read_mimpid() -> usize {
        csr_read!(MIMPID)
    }

    /// Masks machine interrupts, returning the previous `mstatus` word.
    pub fn mask_interrupts() -> usize {
        let prev: usize;
        // SAFETY: Clearing MIE only defers interrupt delivery.
        unsafe {
            asm!(
                "csrrc {prev}, mstatus, {mask}",
                prev = out(reg) prev,
                mask = in(reg) MSTATUS_MIE,
                options(nomem, nostack),
            )
        };
        prev
    }

    /// Restores the interrupt enable saved by [`mask_interrupts`].
    pub fn restore_interrupts(prev: usize) {
        if prev & MSTATUS_MIE != 0 {
            // SAFETY: Re-enables interrupts that were enabled before.
            unsafe {
                asm!(
                    "csrs mstatus, {mask}",
                    mask = in(reg) MSTATUS_MIE,
                    options(nomem, nostack),
                )
            };
        }
    }
}

#[cfg(test)]
use fake as imp;

/// A fake counter register file for unit tests.
///
/// Thread-local so that parallel tests never share hardware state; each test
/// thread looks like an independent hart.
#[cfg(test)]
pub mod fake {
    use core::cell::RefCell;

    pub(super) struct CsrFile {
        mcounteren: usize,
        mcountinhibit: usize,
        counters: [u64; 32],
        mhpmevent: [usize; 32],
        mhartid: usize,
    }

    impl Default for CsrFile {
        fn default() -> Self {
            Self {
                mcounteren: 0,
                // All counters are inhibited when a hart comes out of reset.
                mcountinhibit: usize::MAX,
                counters: [0; 32],
                mhpmevent: [0; 32],
                mhartid: 0,
            }
        }
    }

    std::thread_local! {
        static CSRS: RefCell<CsrFile> = RefCell::new(CsrFile::default());
    }

    /// Resets the fake register file to its boot state.
    pub fn reset() {
        CSRS.with(|c| *c.borrow_mut() = CsrFile::default());
    }

    /// Sets the hart id reported by the fake `mhartid`.
    pub fn set_mhartid(hart_id: usize) {
        CSRS.with(|c| c.borrow_mut().mhartid = hart_id);
    }

    /// Returns the last value programmed into `mhpmevent[idx]`.
    pub fn mhpmevent(idx: usize) -> usize {
        CSRS.with(|c| c.borrow().mhpmevent[idx])
    }

    /// Returns the raw value of the counter at `idx`.
    pub fn counter(idx: usize) -> u64 {
        CSRS.with(|c| c.borrow().counters[idx])
    }

    /// Overwrites the counter at `idx`, emulating hardware ticks.
    pub fn set_counter(idx: usize, value: u64) {
        CSRS.with(|c| c.borrow_mut().counters[idx] = value);
    }

    pub(super) fn read_mcounteren() -> usize {
        CSRS.with(|c| c.borrow().mcounteren)
    }

    pub(super) fn write_mcounteren(value: usize) {
        CSRS.with(|c| c.borrow_mut().mcounteren = value);
    }

    pub(super) fn read_mcountinhibit() -> usize {
        CSRS.with(|c| c.borrow().mcountinhibit)
    }

    pub(super) fn write_mcountinhibit(value: usize) {
        CSRS.with(|c| c.borrow_mut().mcountinhibit = value);
    }

    pub(super) fn read_counter_word(idx: usize) -> usize {
        CSRS.with(|c| c.borrow().counters[idx]) as usize
    }

    pub(super) fn read_counter_high_word(idx: usize) -> usize {
        CSRS.with(|c| c.borrow().counters[idx] >> 32) as usize
    }

    pub(super) fn write_counter_word(idx: usize, value: usize) {
        CSRS.with(|c| c.borrow_mut().counters[idx] = value as u64);
    }

    pub(super) fn write_counter_high_word(idx: usize, value: usize) {
        CSRS.with(|c| {
            let counter = &mut c.borrow_mut().counters[idx];
            *counter = (value as u64) << 32 | *counter & 0xFFFF_FFFF;
        });
    }

    pub(super) fn write_mhpmevent(idx: usize, value: usize) {
        CSRS.with(|c| c.borrow_mut().mhpmevent[idx] = value);
    }

    pub(super) fn read_mhartid() -> usize {
        CSRS.with(|c| c.borrow().mhartid)
    }

    pub(super) fn read_mvendorid() -> usize {
        0
    }

    pub(super) fn read_marchid() -> usize {
        0
    }

    pub(super) fn read_mimpid() -> usize {
        0
    }

    #[cfg(test)]
    mod tests {
        use crate::csr::{self, CounterBits};

        #[test]
        fn counter_bits_ops() {
            let mut bits = CounterBits(0);
            assert!(!bits.test(3));
            bits.set(3);
            assert!(bits.test(3));
            bits.set(0);
            bits.clear(3);
            assert!(!bits.test(3));
            assert!(bits.test(0));
        }

        #[test]
        fn counter_read_write_round_trip() {
            super::reset();
            csr::write_counter(7, 0x1234_5678_9ABC_DEF0);
            assert_eq!(csr::read_counter(7), 0x1234_5678_9ABC_DEF0);
        }

        #[test]
        fn reset_inhibits_all_counters() {
            super::reset();
            assert!(csr::read_mcountinhibit().test(0));
            assert!(!csr::read_mcounteren().test(0));
        }
    }
}
