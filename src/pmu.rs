// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The PMU virtualization core: hardware event registry, counter allocator
//! and per-hart counter state machine.
//!
//! Logical counter indices seen by the supervisor cover the hardware counters
//! first (cycle, the reserved time slot, instret, then the programmable
//! counters) followed by the firmware counters. Counter state is partitioned
//! per hart; no request ever touches another hart's counters.

pub mod event;

use crate::{
    csr,
    hart::PerHartState,
    platform::{Platform, PlatformImpl, exception_free},
    sbi::{
        ERR_ALREADY_STARTED, ERR_ALREADY_STOPPED, ERR_DENIED, ERR_FAILED, ERR_INVALID_ADDRESS,
        ERR_INVALID_PARAM, ERR_NOT_SUPPORTED, SbiRet,
    },
};
use core::cell::RefCell;
use event::{EventIdx, EventType, FirmwareEvent, HwEventRegistry};
use percore::ExceptionLock;
use spin::{Once, mutex::SpinMutex};

/// The largest number of hardware counters the ISA can address.
pub const HW_CTR_MAX: usize = 32;
/// The number of firmware counters appended after the hardware counters.
pub const FW_CTR_MAX: usize = 16;
/// Size of the per-hart firmware counter array.
pub const FW_EVENT_MAX: usize = 32;
/// The logical counter index backed by neither hardware nor firmware (the
/// slot the time CSR occupies in the counter address space).
const RESERVED_CTR_INDEX: usize = 1;
/// The first counter index with a programmable event selector.
const FIRST_PROGRAMMABLE_CTR: usize = 3;

/// Why a PMU request was refused, with the standard SBI error codes as
/// values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(isize)]
pub enum Error {
    /// Internal failure, e.g. the platform declined to encode a selector.
    Fail = ERR_FAILED,
    /// The hart or event lacks the required capability.
    NotSupported = ERR_NOT_SUPPORTED,
    /// Malformed index, range or event encoding.
    Invalid = ERR_INVALID_PARAM,
    /// Registration policy violation.
    Denied = ERR_DENIED,
    /// The registration collides with an existing mapping.
    RangeConflict = ERR_INVALID_ADDRESS,
    /// The counter is already running.
    AlreadyStarted = ERR_ALREADY_STARTED,
    /// The counter is already stopped.
    AlreadyStopped = ERR_ALREADY_STOPPED,
}

impl From<Error> for SbiRet {
    fn from(error: Error) -> Self {
        Self::error(error as isize)
    }
}

/// A software counter emulating the counter interface for firmware events.
#[derive(Clone, Copy, Debug)]
struct FwCounter {
    count: usize,
    started: bool,
}

/// The mutable PMU state owned exclusively by one hart.
struct HartPmuState {
    /// The event bound to each logical counter, [`EventIdx::INVALID`] when
    /// free.
    active_events: [EventIdx; HW_CTR_MAX + FW_CTR_MAX],
    /// One software counter per firmware event code.
    fw_counters: [FwCounter; FW_EVENT_MAX],
}

impl HartPmuState {
    const EMPTY: Self = Self {
        active_events: [EventIdx::INVALID; HW_CTR_MAX + FW_CTR_MAX],
        fw_counters: [FwCounter {
            count: 0,
            started: false,
        }; FW_EVENT_MAX],
    };

    fn reset(&mut self) {
        *self = Self::EMPTY;
    }
}

/// Counter counts fixed once at cold boot.
#[derive(Clone, Copy, Debug)]
struct CounterTopology {
    num_hw_ctrs: usize,
    total_ctrs: usize,
    hw_ctr_width: u32,
}

/// The description of one logical counter, as reported to the supervisor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CounterInfo {
    /// The unprivileged CSR address, for hardware counters.
    pub csr: u16,
    /// The index of the most significant counter bit.
    pub width: u32,
    /// Whether the counter is hardware-backed.
    pub hardware: bool,
}

impl CounterInfo {
    const WIDTH_SHIFT: u32 = 12;

    /// Packs the description into one machine word: CSR address in bits 11:0,
    /// width in bits 17:12 and the counter type in the top bit (0 for
    /// hardware, 1 for firmware).
    pub fn raw(&self) -> usize {
        (!self.hardware as usize) << (usize::BITS - 1)
            | (self.width as usize) << Self::WIDTH_SHIFT
            | self.csr as usize
    }
}

/// The PMU core. One instance serves all harts.
pub struct Pmu {
    hw_events: SpinMutex<HwEventRegistry>,
    topology: Once<CounterTopology>,
    hart_state: PerHartState<HartPmuState>,
}

impl Pmu {
    /// Creates an empty PMU core; [`Self::init`] must run on a hart before it
    /// serves requests there.
    pub const fn new() -> Self {
        Self {
            hw_events: SpinMutex::new(HwEventRegistry::new()),
            topology: Once::new(),
            hart_state: PerHartState::new(
                [const { ExceptionLock::new(RefCell::new(HartPmuState::EMPTY)) };
                    PlatformImpl::HART_COUNT],
            ),
        }
    }

    /// Per-hart initialisation.
    ///
    /// On the cold boot only, fixes the counter topology and runs the
    /// platform's boot-time event registration. On every boot, resets the
    /// calling hart's counter state.
    pub fn init(&self, cold_boot: bool) -> Result<(), Error> {
        if !PlatformImpl::has_counter_inhibit() {
            return Err(Error::NotSupported);
        }
        if cold_boot {
            self.topology.call_once(|| {
                // Cycle, the reserved slot at index 1 and instret sit below
                // the programmable counters in the logical index space.
                let num_hw_ctrs = PlatformImpl::mhpm_counter_count() + 3;
                debug_assert!(num_hw_ctrs <= HW_CTR_MAX);
                CounterTopology {
                    num_hw_ctrs,
                    total_ctrs: num_hw_ctrs + FW_CTR_MAX,
                    hw_ctr_width: PlatformImpl::hw_counter_width(),
                }
            });
            PlatformImpl::register_pmu_events(self);
        }
        // Stop and hide every hardware counter until the supervisor claims
        // one.
        csr::write_mcounteren(csr::CounterBits(0));
        csr::write_mcountinhibit(csr::CounterBits(usize::MAX));
        self.reset_hart_state();
        Ok(())
    }

    /// Per-hart cleanup when a hart is parked or taken offline. Stale
    /// bindings must not survive into the hart's next life.
    pub fn exit(&self) {
        self.reset_hart_state();
    }

    /// The total number of logical counters. Stable after cold boot.
    pub fn num_counters(&self) -> usize {
        self.topology.get().map_or(0, |t| t.total_ctrs)
    }

    /// Registers a hardware event range mapping. Cold boot only; the
    /// registry is immutable once harts serve requests.
    pub fn register_event_range(
        &self,
        start_idx: u32,
        end_idx: u32,
        counter_map: u64,
    ) -> Result<(), Error> {
        self.hw_events
            .lock()
            .register_range(start_idx, end_idx, counter_map)
    }

    /// Registers a raw selector mapping. Cold boot only.
    pub fn register_raw_event(&self, select: u64, counter_map: u64) -> Result<(), Error> {
        self.hw_events.lock().register_raw(select, counter_map)
    }

    /// Describes the logical counter at `idx`.
    pub fn counter_info(&self, idx: usize) -> Result<CounterInfo, Error> {
        let topology = self.counter_topology()?;
        if idx >= topology.total_ctrs || idx == RESERVED_CTR_INDEX {
            return Err(Error::Invalid);
        }
        if idx < topology.num_hw_ctrs {
            Ok(CounterInfo {
                csr: csr::CSR_CYCLE + idx as u16,
                // The cycle and instret counters are always 64 bits wide.
                width: if idx == 0 || idx == 2 {
                    63
                } else {
                    topology.hw_ctr_width
                },
                hardware: true,
            })
        } else {
            Ok(CounterInfo {
                csr: 0,
                // Firmware counters are one native word wide.
                width: usize::BITS - 1,
                hardware: false,
            })
        }
    }

    /// Matches an event to a free counter the caller's mask allows, binds it
    /// on the calling hart and returns its logical index.
    pub fn config_matching(
        &self,
        ctr_base: usize,
        ctr_mask: u64,
        event: EventIdx,
        raw_data: u64,
        _flags: usize,
    ) -> Result<usize, Error> {
        let topology = self.counter_topology()?;
        if ctr_base >= topology.total_ctrs {
            return Err(Error::Invalid);
        }
        let event_type = event.event_type()?;

        exception_free(|token| {
            let mut state = self.hart_state.get().borrow_mut(token);
            let idx = match event_type {
                EventType::Firmware => {
                    find_fw_counter(&state, &topology, ctr_base, ctr_mask, event)?
                }
                _ => self.find_hw_counter(&topology, ctr_base, ctr_mask, event, raw_data)?,
            };
            // Binding is the final step; nothing was mutated before the
            // match succeeded.
            state.active_events[idx] = event;
            Ok(idx)
        })
    }

    /// Starts the counter at `idx` from the given initial value.
    pub fn start_counter(&self, idx: usize, initial_value: u64) -> Result<(), Error> {
        let topology = self.counter_topology()?;
        exception_free(|token| {
            let mut state = self.hart_state.get().borrow_mut(token);
            match bound_event(&state, &topology, idx)? {
                (EventType::Firmware, code) => {
                    // Unlike the hardware path, starting a running firmware
                    // counter is allowed and restarts it.
                    let counter = fw_counter_mut(&mut state, code)?;
                    counter.count = initial_value as usize;
                    counter.started = true;
                    Ok(())
                }
                _ => start_hw_counter(idx, initial_value),
            }
        })
    }

    /// Stops the counter at `idx`; with `reset` the binding is also released
    /// and the counter becomes allocatable again.
    pub fn stop_counter(&self, idx: usize, reset: bool) -> Result<(), Error> {
        let topology = self.counter_topology()?;
        exception_free(|token| {
            let mut state = self.hart_state.get().borrow_mut(token);
            let result = match bound_event(&state, &topology, idx)? {
                (EventType::Firmware, code) => {
                    // Stopping a stopped firmware counter is allowed.
                    fw_counter_mut(&mut state, code)?.started = false;
                    Ok(())
                }
                _ => stop_hw_counter(idx),
            };
            if result.is_ok() && reset {
                state.active_events[idx] = EventIdx::INVALID;
            }
            result
        })
    }

    /// Reads the current value of the counter at `idx` without changing its
    /// state.
    pub fn read_counter(&self, idx: usize) -> Result<u64, Error> {
        let topology = self.counter_topology()?;
        exception_free(|token| {
            let state = self.hart_state.get().borrow_mut(token);
            match bound_event(&state, &topology, idx)? {
                (EventType::Firmware, code) => {
                    let code = code as usize;
                    if code >= FW_EVENT_MAX {
                        return Err(Error::Invalid);
                    }
                    Ok(state.fw_counters[code].count as u64)
                }
                _ => Ok(csr::read_counter(idx)),
            }
        })
    }

    /// Counts one occurrence of a firmware event on the calling hart.
    ///
    /// A no-op unless the event's counter has been configured and started;
    /// the count wraps at the native word width.
    pub fn incr_firmware_counter(&self, fw_event_code: u16) -> Result<(), Error> {
        FirmwareEvent::try_from(fw_event_code).map_err(|_| Error::Invalid)?;
        exception_free(|token| {
            let mut state = self.hart_state.get().borrow_mut(token);
            let counter = &mut state.fw_counters[fw_event_code as usize];
            if counter.started {
                counter.count = counter.count.wrapping_add(1);
            }
        });
        Ok(())
    }

    /// First-fit search over the hardware counters allowed by both the
    /// owning mapping and the caller's mask, then selector programming for
    /// non-fixed events.
    fn find_hw_counter(
        &self,
        topology: &CounterTopology,
        ctr_base: usize,
        ctr_mask: u64,
        event: EventIdx,
        raw_data: u64,
    ) -> Result<usize, Error> {
        let registry = self.hw_events.lock();
        let mapping = registry.lookup(event, raw_data).ok_or(Error::NotSupported)?;

        let enabled = csr::read_mcounteren();
        let inhibited = csr::read_mcountinhibit();
        let candidates = mapping.counters() & ctr_mask << ctr_base;

        let idx = (ctr_base..topology.num_hw_ctrs)
            .find(|&idx| {
                // A hardware counter is free when its enable bit is clear
                // and its inhibit bit is set.
                candidates & 1 << idx != 0 && !enabled.test(idx) && inhibited.test(idx)
            })
            .ok_or(Error::NotSupported)?;

        if !event.is_fixed_function() {
            if !(FIRST_PROGRAMMABLE_CTR..HW_CTR_MAX).contains(&idx) {
                return Err(Error::Fail);
            }
            let select =
                PlatformImpl::encode_selector(event, raw_data).ok_or(Error::Fail)?;
            csr::write_mhpmevent(idx, select);
        }
        Ok(idx)
    }

    fn reset_hart_state(&self) {
        exception_free(|token| self.hart_state.get().borrow_mut(token).reset());
    }

    fn counter_topology(&self) -> Result<CounterTopology, Error> {
        self.topology.get().copied().ok_or(Error::NotSupported)
    }
}

/// Any firmware counter can count any firmware event: first-fit from the
/// firmware range for an index the mask allows and no event is bound to.
fn find_fw_counter(
    state: &HartPmuState,
    topology: &CounterTopology,
    ctr_base: usize,
    ctr_mask: u64,
    event: EventIdx,
) -> Result<usize, Error> {
    FirmwareEvent::try_from(event.code()).map_err(|_| Error::Invalid)?;
    let candidates = ctr_mask << ctr_base;
    (ctr_base.max(topology.num_hw_ctrs)..topology.total_ctrs)
        .find(|&idx| candidates & 1 << idx != 0 && state.active_events[idx] == EventIdx::INVALID)
        .ok_or(Error::NotSupported)
}

/// Decodes the event bound to the counter at `idx`, or `Invalid` if the
/// index is out of range or nothing is bound.
fn bound_event(
    state: &HartPmuState,
    topology: &CounterTopology,
    idx: usize,
) -> Result<(EventType, u16), Error> {
    if idx >= topology.total_ctrs {
        return Err(Error::Invalid);
    }
    let event = state.active_events[idx];
    if event == EventIdx::INVALID {
        return Err(Error::Invalid);
    }
    Ok((event.event_type()?, event.code()))
}

fn fw_counter_mut<'a>(
    state: &'a mut HartPmuState,
    code: u16,
) -> Result<&'a mut FwCounter, Error> {
    state
        .fw_counters
        .get_mut(code as usize)
        .ok_or(Error::Invalid)
}

fn start_hw_counter(idx: usize, initial_value: u64) -> Result<(), Error> {
    let mut enabled = csr::read_mcounteren();
    let mut inhibited = csr::read_mcountinhibit();
    if enabled.test(idx) && !inhibited.test(idx) {
        return Err(Error::AlreadyStarted);
    }
    enabled.set(idx);
    inhibited.clear(idx);
    csr::write_mcounteren(enabled);
    csr::write_mcountinhibit(inhibited);
    csr::write_counter(idx, initial_value);
    Ok(())
}

fn stop_hw_counter(idx: usize) -> Result<(), Error> {
    let mut enabled = csr::read_mcounteren();
    let mut inhibited = csr::read_mcountinhibit();
    if !enabled.test(idx) || inhibited.test(idx) {
        return Err(Error::AlreadyStopped);
    }
    enabled.clear(idx);
    inhibited.set(idx);
    csr::write_mcounteren(enabled);
    csr::write_mcountinhibit(inhibited);
    Ok(())
}
