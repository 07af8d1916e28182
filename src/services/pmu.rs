// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The PMU extension call surface.
//!
//! Marshals `ecall` argument words into requests on the [`Pmu`] core and the
//! core's results back into [`SbiRet`] pairs.

use super::Extension;
use crate::{
    csr,
    pmu::{Error, Pmu, event::EventIdx},
    sbi::{ERR_NOT_SUPPORTED, ExtensionId, SbiRet},
};
use bitflags::bitflags;

/// Returns the number of counters.
pub const NUM_COUNTERS: u32 = 0;
/// Returns the description of a counter.
pub const COUNTER_GET_INFO: u32 = 1;
/// Finds and configures a matching counter.
pub const COUNTER_CFG_MATCH: u32 = 2;
/// Starts one counter.
pub const COUNTER_START: u32 = 3;
/// Stops one counter.
pub const COUNTER_STOP: u32 = 4;
/// Reads a firmware counter.
pub const COUNTER_FW_READ: u32 = 5;

bitflags! {
    /// Flag bits of the counter stop call.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct StopFlags: usize {
        /// Release the counter's event binding after stopping it.
        const RESET = 1 << 0;
    }
}

/// The PMU extension.
pub struct PmuExtension {
    /// The counter virtualization core, shared with the firmware event hook
    /// sites.
    pub counters: Pmu,
}

impl PmuExtension {
    pub(super) fn new() -> Self {
        Self {
            counters: Pmu::new(),
        }
    }
}

impl Extension for PmuExtension {
    fn owns(&self, extension: ExtensionId) -> bool {
        extension == ExtensionId::PMU
    }

    fn handle(&self, function: u32, args: &[usize; 6]) -> SbiRet {
        match function {
            NUM_COUNTERS => self.counters.num_counters().into(),
            COUNTER_GET_INFO => match self.counters.counter_info(args[0]) {
                Ok(info) => SbiRet::success(info.raw()),
                Err(e) => e.into(),
            },
            COUNTER_CFG_MATCH => into_ret(self.counters.config_matching(
                args[0],
                args[1] as u64,
                EventIdx(args[2] as u32),
                args[3] as u64,
                args[4],
            )),
            COUNTER_START => {
                let initial_value = wide_value(args[1], args[2]);
                into_ret(self.counters.start_counter(args[0], initial_value).map(|()| 0))
            }
            COUNTER_STOP => {
                let flags = StopFlags::from_bits_truncate(args[1]);
                let reset = flags.contains(StopFlags::RESET);
                into_ret(self.counters.stop_counter(args[0], reset).map(|()| 0))
            }
            COUNTER_FW_READ => {
                into_ret(self.counters.read_counter(args[0]).map(|v| v as usize))
            }
            _ => SbiRet::error(ERR_NOT_SUPPORTED),
        }
    }
}

fn into_ret(result: Result<usize, Error>) -> SbiRet {
    match result {
        Ok(value) => SbiRet::success(value),
        Err(e) => e.into(),
    }
}

/// Assembles a 64-bit value from one argument word, or from a low/high pair
/// on machines whose words are narrower than the counters.
fn wide_value(lo: usize, hi: usize) -> u64 {
    if csr::SPLIT_COUNTER_ACCESS {
        (hi as u64) << 32 | lo as u64
    } else {
        lo as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        csr::fake,
        pmu::{FW_CTR_MAX, event::EventType},
        sbi::{ERR_INVALID_PARAM, ERR_NOT_SUPPORTED},
    };

    const SET_TIMER_EVENT: usize = 0xF_0005;

    fn init_extension() -> PmuExtension {
        fake::reset();
        let extension = PmuExtension::new();
        extension.counters.init(true).unwrap();
        extension
            .counters
            .register_event_range(EventIdx::CPU_CYCLES.0, EventIdx::CPU_CYCLES.0, 0x1)
            .unwrap();
        extension
    }

    fn call(extension: &PmuExtension, function: u32, args: [usize; 6]) -> SbiRet {
        extension.handle(function, &args)
    }

    #[test]
    fn num_counters() {
        let extension = init_extension();
        let expected = 9 + FW_CTR_MAX;
        assert_eq!(
            call(&extension, NUM_COUNTERS, [0; 6]),
            SbiRet::success(expected)
        );
    }

    #[test]
    fn counter_info_is_packed() {
        let extension = init_extension();
        let result = call(&extension, COUNTER_GET_INFO, [0, 0, 0, 0, 0, 0]);
        assert_eq!(result.error, 0);
        assert_eq!(result.value & 0xFFF, 0xC00);
        assert_eq!(result.value >> 12 & 0x3F, 63);

        let result = call(&extension, COUNTER_GET_INFO, [1, 0, 0, 0, 0, 0]);
        assert_eq!(result.error, ERR_INVALID_PARAM);
    }

    #[test]
    fn firmware_counter_through_ecall() {
        let extension = init_extension();

        let result = call(
            &extension,
            COUNTER_CFG_MATCH,
            [0, usize::MAX, SET_TIMER_EVENT, 0, 0, 0],
        );
        assert_eq!(result.error, 0);
        let idx = result.value;

        assert_eq!(
            call(&extension, COUNTER_START, [idx, 7, 0, 0, 0, 0]),
            SbiRet::success(0)
        );
        extension.counters.incr_firmware_counter(5).unwrap();
        assert_eq!(
            call(&extension, COUNTER_FW_READ, [idx, 0, 0, 0, 0, 0]),
            SbiRet::success(8)
        );

        // Stop with the reset flag releases the binding.
        assert_eq!(
            call(
                &extension,
                COUNTER_STOP,
                [idx, StopFlags::RESET.bits(), 0, 0, 0, 0]
            ),
            SbiRet::success(0)
        );
        assert_eq!(
            call(&extension, COUNTER_FW_READ, [idx, 0, 0, 0, 0, 0]),
            SbiRet::error(ERR_INVALID_PARAM)
        );
    }

    #[test]
    fn hardware_counter_through_ecall() {
        let extension = init_extension();
        let cycles = EventIdx::new(EventType::Hardware, 1);

        let result = call(
            &extension,
            COUNTER_CFG_MATCH,
            [0, usize::MAX, cycles.0 as usize, 0, 0, 0],
        );
        assert_eq!(result, SbiRet::success(0));

        assert_eq!(
            call(&extension, COUNTER_START, [0, 123, 0, 0, 0, 0]),
            SbiRet::success(0)
        );
        assert_eq!(fake::counter(0), 123);
    }

    #[test]
    fn unknown_function_not_supported() {
        let extension = init_extension();
        assert_eq!(
            call(&extension, 6, [0; 6]),
            SbiRet::error(ERR_NOT_SUPPORTED)
        );
    }
}
