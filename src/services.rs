// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

pub mod base;
pub mod pmu;

use crate::sbi::{ERR_NOT_SUPPORTED, ExtensionId, SbiRet};
use spin::Lazy;

/// The extension ids this implementation answers probes for.
pub const KNOWN_EXTENSIONS: &[ExtensionId] = &[ExtensionId::BASE, ExtensionId::PMU];

/// A service handling one SBI extension.
pub trait Extension {
    /// Returns whether this service handles the given extension id.
    fn owns(&self, extension: ExtensionId) -> bool;

    /// Handles an SBI call to this extension.
    fn handle(&self, function: u32, args: &[usize; 6]) -> SbiRet;
}

static SERVICES: Lazy<Services> = Lazy::new(Services::new);

/// Contains an instance of all of the currently implemented extensions.
pub struct Services {
    /// The Base extension.
    pub base: base::Base,
    /// The PMU extension.
    pub pmu: pmu::PmuExtension,
}

impl Services {
    /// Returns a reference to the global Services instance.
    ///
    /// Also, initializes it if it hasn't been initialized yet.
    pub fn get() -> &'static Self {
        &SERVICES
    }

    fn new() -> Self {
        Self {
            base: base::Base::new(),
            pmu: pmu::PmuExtension::new(),
        }
    }

    /// Dispatches an `ecall` from supervisor mode to the owning extension.
    pub fn handle_ecall(&self, extension: usize, function: usize, args: &[usize; 6]) -> SbiRet {
        let extension = ExtensionId(extension);

        let service: &dyn Extension = if self.base.owns(extension) {
            &self.base
        } else if self.pmu.owns(extension) {
            &self.pmu
        } else {
            return SbiRet::error(ERR_NOT_SUPPORTED);
        };

        service.handle(function as u32, args)
    }
}
