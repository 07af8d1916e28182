// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The Base extension: implementation identity and extension probing.

use super::{Extension, KNOWN_EXTENSIONS};
use crate::{
    csr,
    sbi::{ERR_NOT_SUPPORTED, ExtensionId, SbiRet},
};

/// Returns the SBI specification version.
pub const GET_SPEC_VERSION: u32 = 0;
/// Returns the implementation id.
pub const GET_IMPL_ID: u32 = 1;
/// Returns the implementation version.
pub const GET_IMPL_VERSION: u32 = 2;
/// Returns whether the given extension id is available.
pub const PROBE_EXTENSION: u32 = 3;
/// Returns the value of `mvendorid`.
pub const GET_MVENDORID: u32 = 4;
/// Returns the value of `marchid`.
pub const GET_MARCHID: u32 = 5;
/// Returns the value of `mimpid`.
pub const GET_MIMPID: u32 = 6;

/// SBI specification v2.0: major version in bits 30:24, minor in 23:0.
pub const SPEC_VERSION: usize = 2 << 24;
/// The implementation id, "RSBI" in ASCII. Deliberately outside the range of
/// ids assigned to existing SBI implementations.
const IMPL_ID: usize = 0x5253_4249;
/// The implementation version, from the crate version's major and minor.
const IMPL_VERSION: usize = 1;

/// The Base extension.
pub struct Base;

impl Base {
    pub(super) fn new() -> Self {
        Self
    }
}

impl Extension for Base {
    fn owns(&self, extension: ExtensionId) -> bool {
        extension == ExtensionId::BASE
    }

    fn handle(&self, function: u32, args: &[usize; 6]) -> SbiRet {
        match function {
            GET_SPEC_VERSION => SPEC_VERSION.into(),
            GET_IMPL_ID => IMPL_ID.into(),
            GET_IMPL_VERSION => IMPL_VERSION.into(),
            PROBE_EXTENSION => {
                let probed = ExtensionId(args[0]);
                SbiRet::success(KNOWN_EXTENSIONS.contains(&probed) as usize)
            }
            GET_MVENDORID => csr::read_mvendorid().into(),
            GET_MARCHID => csr::read_marchid().into(),
            GET_MIMPID => csr::read_mimpid().into(),
            _ => SbiRet::error(ERR_NOT_SUPPORTED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(function: u32, arg0: usize) -> SbiRet {
        let mut args = [0; 6];
        args[0] = arg0;
        Base::new().handle(function, &args)
    }

    #[test]
    fn spec_version() {
        assert_eq!(call(GET_SPEC_VERSION, 0), SbiRet::success(2 << 24));
    }

    #[test]
    fn impl_id_and_version() {
        assert_eq!(call(GET_IMPL_ID, 0), SbiRet::success(0x5253_4249));
        assert_eq!(call(GET_IMPL_VERSION, 0), SbiRet::success(1));
    }

    #[test]
    fn probe_known_extensions() {
        assert_eq!(
            call(PROBE_EXTENSION, ExtensionId::PMU.0),
            SbiRet::success(1)
        );
        assert_eq!(
            call(PROBE_EXTENSION, ExtensionId::BASE.0),
            SbiRet::success(1)
        );
        assert_eq!(call(PROBE_EXTENSION, 0x99), SbiRet::success(0));
    }

    #[test]
    fn unknown_function_not_supported() {
        assert_eq!(call(7, 0), SbiRet::error(ERR_NOT_SUPPORTED));
    }
}
