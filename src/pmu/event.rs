// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Event identifiers and the hardware event registry.

use super::Error;
use arrayvec::ArrayVec;
use num_enum::TryFromPrimitive;

/// Capacity of the hardware event registry.
pub const HW_EVENT_MAX: usize = 64;

/// An encoded PMU event identifier: type in bits 19:16, event code in 15:0.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct EventIdx(pub u32);

impl EventIdx {
    /// Marker for a counter with no bound event.
    pub const INVALID: Self = Self(u32::MAX);
    /// All raw events share this identifier; the selector value passed
    /// alongside disambiguates them.
    pub const RAW: Self = Self(0x2_0000);
    /// CPU cycle count, architecturally fixed to counter 0.
    pub const CPU_CYCLES: Self = Self(1);
    /// Retired instruction count, architecturally fixed to counter 2.
    pub const INSTRUCTIONS: Self = Self(2);

    const TYPE_SHIFT: u32 = 16;
    const TYPE_MASK: u32 = 0xF_0000;
    const CODE_MASK: u32 = 0xFFFF;

    /// Builds an event identifier from a type and event code.
    pub const fn new(event_type: EventType, code: u16) -> Self {
        Self((event_type as u32) << Self::TYPE_SHIFT | code as u32)
    }

    /// Decodes the event type field.
    pub fn event_type(self) -> Result<EventType, Error> {
        EventType::try_from(((self.0 & Self::TYPE_MASK) >> Self::TYPE_SHIFT) as u8)
            .map_err(|_| Error::Invalid)
    }

    /// The event code in the low 16 bits.
    pub fn code(self) -> u16 {
        (self.0 & Self::CODE_MASK) as u16
    }

    /// Whether this is one of the two fixed-function hardware events.
    pub fn is_fixed_function(self) -> bool {
        self == Self::CPU_CYCLES || self == Self::INSTRUCTIONS
    }
}

/// The PMU event classes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum EventType {
    /// A generic hardware event.
    Hardware = 0,
    /// A hardware cache event.
    HardwareCache = 1,
    /// A raw, platform-defined hardware event.
    HardwareRaw = 2,
    /// An event counted by the firmware itself.
    Firmware = 15,
}

/// The events the firmware counts on behalf of the supervisor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum FirmwareEvent {
    MisalignedLoad = 0,
    MisalignedStore = 1,
    AccessLoad = 2,
    AccessStore = 3,
    IllegalInstruction = 4,
    SetTimer = 5,
    IpiSent = 6,
    IpiReceived = 7,
    FenceISent = 8,
    FenceIReceived = 9,
    SfenceVmaSent = 10,
    SfenceVmaReceived = 11,
    SfenceVmaAsidSent = 12,
    SfenceVmaAsidReceived = 13,
    HfenceGvmaSent = 14,
    HfenceGvmaReceived = 15,
    HfenceGvmaVmidSent = 16,
    HfenceGvmaVmidReceived = 17,
    HfenceVvmaSent = 18,
    HfenceVvmaReceived = 19,
    HfenceVvmaAsidSent = 20,
    HfenceVvmaAsidReceived = 21,
}

/// Counter bitmap bits reserved for the fixed-function counters and the
/// unimplemented index 1.
const RESERVED_COUNTER_MAP: u64 = 0b111;
/// The only counter bitmap the cycle event may claim.
const CYCLE_COUNTER_MAP: u64 = 0x1;
/// The only counter bitmap the instret event may claim.
const INSTRET_COUNTER_MAP: u64 = 0x4;

/// A mapping from a hardware event range or raw selector to the counters
/// that can count it.
#[derive(Clone, Copy, Debug)]
pub struct HwEventMapping {
    start_idx: u32,
    end_idx: u32,
    counters: u64,
    /// The selector value; meaningful for raw mappings only.
    select: u64,
}

impl HwEventMapping {
    fn is_raw(&self) -> bool {
        self.start_idx == EventIdx::RAW.0
    }

    fn contains(&self, start: u32, end: u32) -> bool {
        self.start_idx <= end && start <= self.end_idx
    }

    /// The bitmap of hardware counters able to count this event.
    pub fn counters(&self) -> u64 {
        self.counters
    }
}

/// The table of hardware event mappings.
///
/// Populated by the platform during cold boot and immutable once harts start
/// serving supervisor requests.
pub struct HwEventRegistry {
    events: ArrayVec<HwEventMapping, HW_EVENT_MAX>,
}

impl HwEventRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            events: ArrayVec::new_const(),
        }
    }

    /// Registers a mapping from an inclusive event index range to a counter
    /// bitmap.
    pub fn register_range(
        &mut self,
        start_idx: u32,
        end_idx: u32,
        counter_map: u64,
    ) -> Result<(), Error> {
        if start_idx > end_idx || start_idx == EventIdx::RAW.0 || end_idx == EventIdx::RAW.0 {
            return Err(Error::Invalid);
        }
        self.check_policy(start_idx, counter_map)?;
        self.check_capacity()?;
        if self
            .events
            .iter()
            .any(|e| !e.is_raw() && e.contains(start_idx, end_idx))
        {
            return Err(Error::RangeConflict);
        }
        self.events.push(HwEventMapping {
            start_idx,
            end_idx,
            counters: counter_map,
            select: 0,
        });
        Ok(())
    }

    /// Registers a mapping from a raw selector value to a counter bitmap.
    pub fn register_raw(&mut self, select: u64, counter_map: u64) -> Result<(), Error> {
        self.check_policy(EventIdx::RAW.0, counter_map)?;
        self.check_capacity()?;
        if self.events.iter().any(|e| e.is_raw() && e.select == select) {
            return Err(Error::RangeConflict);
        }
        self.events.push(HwEventMapping {
            start_idx: EventIdx::RAW.0,
            end_idx: EventIdx::RAW.0,
            counters: counter_map,
            select,
        });
        Ok(())
    }

    /// Finds the mapping owning the given event, if any.
    pub fn lookup(&self, event: EventIdx, raw_data: u64) -> Option<&HwEventMapping> {
        self.events.iter().find(|e| {
            if e.is_raw() {
                event == EventIdx::RAW && e.select == raw_data
            } else {
                e.start_idx <= event.0 && event.0 <= e.end_idx
            }
        })
    }

    /// The fixed-function events may only claim their architected counter;
    /// nothing else may claim the reserved low counter indices.
    fn check_policy(&self, start_idx: u32, counter_map: u64) -> Result<(), Error> {
        let allowed = match EventIdx(start_idx) {
            EventIdx::CPU_CYCLES => counter_map == CYCLE_COUNTER_MAP,
            EventIdx::INSTRUCTIONS => counter_map == INSTRET_COUNTER_MAP,
            _ => counter_map & RESERVED_COUNTER_MAP == 0,
        };
        if allowed { Ok(()) } else { Err(Error::Denied) }
    }

    fn check_capacity(&self) -> Result<(), Error> {
        if self.events.is_full() {
            Err(Error::Fail)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_idx_fields() {
        let event = EventIdx::new(EventType::Firmware, 5);
        assert_eq!(event.0, 0xF_0005);
        assert_eq!(event.event_type(), Ok(EventType::Firmware));
        assert_eq!(event.code(), 5);
        assert_eq!(EventIdx::RAW.event_type(), Ok(EventType::HardwareRaw));
        assert!(EventIdx::CPU_CYCLES.is_fixed_function());
        assert!(!EventIdx::RAW.is_fixed_function());
    }

    #[test]
    fn unknown_event_type_rejected() {
        assert_eq!(EventIdx(0x3_0000).event_type(), Err(Error::Invalid));
        assert_eq!(EventIdx(0xE_0001).event_type(), Err(Error::Invalid));
    }

    #[test]
    fn range_registration_and_lookup() {
        let mut registry = HwEventRegistry::new();
        registry.register_range(3, 10, 0xF8).unwrap();
        assert!(registry.lookup(EventIdx(3), 0).is_some());
        assert!(registry.lookup(EventIdx(10), 0).is_some());
        assert!(registry.lookup(EventIdx(11), 0).is_none());
    }

    #[test]
    fn overlapping_ranges_rejected() {
        let mut registry = HwEventRegistry::new();
        registry.register_range(3, 10, 0xF8).unwrap();
        // Partial overlap, containment and a touching boundary all conflict.
        assert_eq!(
            registry.register_range(8, 12, 0xF0),
            Err(Error::RangeConflict)
        );
        assert_eq!(
            registry.register_range(4, 6, 0xF0),
            Err(Error::RangeConflict)
        );
        assert_eq!(
            registry.register_range(10, 20, 0xF0),
            Err(Error::RangeConflict)
        );
        // An adjacent but disjoint range is fine.
        registry.register_range(11, 20, 0xF0).unwrap();
    }

    #[test]
    fn invalid_range_bounds_rejected() {
        let mut registry = HwEventRegistry::new();
        assert_eq!(registry.register_range(5, 4, 0xF8), Err(Error::Invalid));
        assert_eq!(
            registry.register_range(EventIdx::RAW.0, EventIdx::RAW.0, 0xF8),
            Err(Error::Invalid)
        );
        assert_eq!(
            registry.register_range(3, EventIdx::RAW.0, 0xF8),
            Err(Error::Invalid)
        );
    }

    #[test]
    fn fixed_function_policy() {
        let mut registry = HwEventRegistry::new();
        // The cycle and instret events only accept their own counter.
        assert_eq!(registry.register_range(1, 1, 0x2), Err(Error::Denied));
        assert_eq!(registry.register_range(2, 2, 0x2), Err(Error::Denied));
        registry.register_range(1, 1, 0x1).unwrap();
        registry.register_range(2, 2, 0x4).unwrap();
        // Other events must stay clear of counters 0..=2.
        assert_eq!(registry.register_range(3, 5, 0x9), Err(Error::Denied));
        assert_eq!(registry.register_raw(0x42, 0x4), Err(Error::Denied));
    }

    #[test]
    fn raw_registration_and_lookup() {
        let mut registry = HwEventRegistry::new();
        registry.register_raw(0x99, 0xF8).unwrap();
        assert_eq!(registry.register_raw(0x99, 0xF0), Err(Error::RangeConflict));
        registry.register_raw(0x9A, 0xF0).unwrap();

        assert!(registry.lookup(EventIdx::RAW, 0x99).is_some());
        assert!(registry.lookup(EventIdx::RAW, 0x42).is_none());
        // A raw entry never matches an ordinary event index.
        assert!(registry.lookup(EventIdx(0x99), 0x99).is_none());
    }

    #[test]
    fn capacity_exhaustion_fails() {
        let mut registry = HwEventRegistry::new();
        for i in 0..HW_EVENT_MAX as u32 {
            registry.register_range(100 + 2 * i, 101 + 2 * i, 0xF8).unwrap();
        }
        assert_eq!(
            registry.register_range(1000, 1001, 0xF8),
            Err(Error::Fail)
        );
    }
}
