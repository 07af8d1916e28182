// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use super::Platform;
use crate::{
    logger::{self, LogSink},
    pmu::{
        Pmu,
        event::{EventIdx, EventType},
    },
};
use core::fmt;
use percore::ExceptionFree;
use std::io::{Write, stdout};

/// A fake platform for unit tests.
pub struct TestPlatform;

impl TestPlatform {
    /// Largest generic hardware event code the fake selector encoder accepts.
    pub const MAX_ENCODABLE_CODE: u16 = 0x1F;
}

impl Platform for TestPlatform {
    const HART_COUNT: usize = 4;

    type LogSinkImpl = StdOutSink;

    fn init() {
        logger::init(StdOutSink).expect("Failed to initialise logger");
    }

    fn hart_index(hart_id: usize) -> usize {
        hart_id
    }

    fn mhpm_counter_count() -> usize {
        6
    }

    fn hw_counter_width() -> u32 {
        // Deliberately narrower than the fixed counters so tests can tell
        // the two widths apart.
        47
    }

    fn has_counter_inhibit() -> bool {
        true
    }

    fn encode_selector(event: EventIdx, raw_data: u64) -> Option<usize> {
        match event.event_type().ok()? {
            EventType::HardwareRaw => (raw_data != 0).then_some(raw_data as usize),
            EventType::Hardware if event.code() <= Self::MAX_ENCODABLE_CODE => {
                Some(0x100 | event.code() as usize)
            }
            _ => None,
        }
    }

    fn register_pmu_events(_pmu: &Pmu) {
        // Tests drive registration themselves.
    }
}

/// This is a fake version of `exception_free` for use in unit tests only, which must be run on the
/// host.
pub fn exception_free<T>(f: impl FnOnce(ExceptionFree) -> T) -> T {
    // SAFETY: This is only used in unit tests, which are run on the host where there are no
    // machine-mode exceptions, and the state behind the lock is thread-local.
    let token = unsafe { ExceptionFree::new() };
    f(token)
}

/// A log sink for tests which writes logs to standard output.
pub struct StdOutSink;

impl LogSink for StdOutSink {
    fn write_fmt(&self, args: fmt::Arguments) {
        stdout().write_fmt(args).unwrap();
    }
}
