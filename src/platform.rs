// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

macro_rules! select_platform {
    (platform = $condition:literal, $mod:ident::$plat_impl:ident) => {
        #[cfg(platform = $condition)]
        mod $mod;

        #[cfg(platform = $condition)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
    (test, $mod:ident::$plat_impl:ident) => {
        #[cfg(test)]
        pub mod $mod;

        #[cfg(test)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
}

select_platform!(platform = "qemu", qemu::Qemu);
select_platform!(test, test::TestPlatform);

use crate::{
    logger::LogSink,
    pmu::{Pmu, event::EventIdx},
};
#[cfg(all(target_arch = "riscv64", not(test)))]
pub use crate::hart::exception_free;
#[cfg(test)]
pub use test::exception_free;

/// Type alias for convenience, to avoid having to use the complicated type name everywhere.
pub type LogSinkImpl = <PlatformImpl as Platform>::LogSinkImpl;

/// The hooks implemented by all platforms.
pub trait Platform {
    /// The number of harts.
    const HART_COUNT: usize;

    /// Platform dependent LogSink implementation type for Logger.
    type LogSinkImpl: LogSink;

    /// Initialises the logger and anything else the platform needs.
    ///
    /// Any logs sent before this is called will be ignored.
    fn init();

    /// Given a valid hart id, returns the corresponding dense hart index.
    ///
    /// The implementation must never return the same index for two different
    /// valid hart ids, and must never return a value greater than or equal to
    /// [`Self::HART_COUNT`].
    fn hart_index(hart_id: usize) -> usize;

    /// The number of programmable `mhpmcounter` CSRs the harts implement, not
    /// counting the fixed cycle and instret counters.
    fn mhpm_counter_count() -> usize;

    /// The index of the most significant bit of the programmable hardware
    /// counters.
    fn hw_counter_width() -> u32;

    /// Whether the harts implement the `mcountinhibit` CSR.
    fn has_counter_inhibit() -> bool;

    /// Computes the selector value to program into an event selector CSR for
    /// the given event, or `None` if the platform cannot encode it.
    fn encode_selector(event: EventIdx, raw_data: u64) -> Option<usize>;

    /// Boot-time hook registering the platform's hardware event mappings.
    fn register_pmu_events(pmu: &Pmu);
}
