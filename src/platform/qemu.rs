// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Support for the QEMU virt machine.

use super::Platform;
use crate::{
    logger::{self, LockedWriter},
    pmu::{
        Pmu,
        event::{EventIdx, EventType},
    },
};
use core::fmt::{self, Write};

/// Base address of the virt machine's ns16550 UART.
const UART_BASE: usize = 0x1000_0000;

/// Event selector encodings understood by the virt machine's PMU model,
/// keyed by generic hardware event code. The boot-time analog of the event
/// mapping a device tree advertises on real hardware.
const EVENT_SELECTORS: &[(u16, usize)] = &[
    // Cache references and misses.
    (3, 0x12),
    (4, 0x13),
    // Branch instructions and mispredictions.
    (5, 0x19),
    (6, 0x1A),
];

/// Counter bitmap for the programmable counters backing the generic events:
/// mhpmcounter3..18 occupy logical indices 3..=18.
const PROGRAMMABLE_CTR_MAP: u64 = 0x7_FFF8;

/// The QEMU virt platform.
pub struct Qemu;

impl Platform for Qemu {
    const HART_COUNT: usize = 8;

    type LogSinkImpl = LockedWriter<Uart>;

    fn init() {
        logger::init(LockedWriter::new(Uart::new())).expect("Failed to initialise logger");
    }

    fn hart_index(hart_id: usize) -> usize {
        // Hart ids are dense on the virt machine.
        hart_id
    }

    fn mhpm_counter_count() -> usize {
        // The virt machine implements mhpmcounter3..18.
        16
    }

    fn hw_counter_width() -> u32 {
        63
    }

    fn has_counter_inhibit() -> bool {
        true
    }

    fn encode_selector(event: EventIdx, raw_data: u64) -> Option<usize> {
        match event.event_type().ok()? {
            EventType::HardwareRaw => {
                // A zero selector would leave the counter counting nothing.
                (raw_data != 0).then_some(raw_data as usize)
            }
            EventType::Hardware => EVENT_SELECTORS
                .iter()
                .find(|(code, _)| *code == event.code())
                .map(|(_, select)| *select),
            _ => None,
        }
    }

    fn register_pmu_events(pmu: &Pmu) {
        pmu.register_event_range(EventIdx::CPU_CYCLES.0, EventIdx::CPU_CYCLES.0, 0x1)
            .expect("Failed to register cycle event");
        pmu.register_event_range(EventIdx::INSTRUCTIONS.0, EventIdx::INSTRUCTIONS.0, 0x4)
            .expect("Failed to register instret event");
        pmu.register_event_range(3, 6, PROGRAMMABLE_CTR_MAP)
            .expect("Failed to register generic hardware events");
        // The same selectors are reachable through the raw event interface.
        for (_, select) in EVENT_SELECTORS {
            pmu.register_raw_event(*select as u64, PROGRAMMABLE_CTR_MAP)
                .expect("Failed to register raw event");
        }
    }
}

/// Minimal driver for the virt machine's ns16550 UART.
pub struct Uart {
    base: *mut u8,
}

// SAFETY: The UART MMIO registers are only touched through this driver, and
// the single instance lives behind the logger's lock.
unsafe impl Send for Uart {}

impl Uart {
    const LSR: usize = 5;
    const LSR_THRE: u8 = 0x20;

    const fn new() -> Self {
        Self {
            base: UART_BASE as *mut u8,
        }
    }

    fn put_byte(&mut self, byte: u8) {
        // SAFETY: `base` points at the virt machine's UART register block,
        // which stays mapped for the lifetime of the firmware.
        unsafe {
            while self.base.add(Self::LSR).read_volatile() & Self::LSR_THRE == 0 {
                core::hint::spin_loop();
            }
            self.base.write_volatile(byte);
        }
    }
}

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.put_byte(b'\r');
            }
            self.put_byte(byte);
        }
        Ok(())
    }
}
