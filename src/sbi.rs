// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Types for the SBI binary calling convention.

/// An SBI extension id, as passed in register a7.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct ExtensionId(pub usize);

impl ExtensionId {
    /// The Base extension.
    pub const BASE: Self = Self(0x10);
    /// The Performance Monitoring Unit extension ("PMU").
    pub const PMU: Self = Self(0x0050_4D55);
}

/// Completed successfully.
pub const SUCCESS: isize = 0;
/// Failed for an unspecified or internal reason.
pub const ERR_FAILED: isize = -1;
/// Not supported or not implemented.
pub const ERR_NOT_SUPPORTED: isize = -2;
/// An invalid parameter was passed.
pub const ERR_INVALID_PARAM: isize = -3;
/// Denied or not allowed.
pub const ERR_DENIED: isize = -4;
/// An invalid address range was passed.
pub const ERR_INVALID_ADDRESS: isize = -5;
/// The resource is already started.
pub const ERR_ALREADY_STARTED: isize = -7;
/// The resource is already stopped.
pub const ERR_ALREADY_STOPPED: isize = -8;

/// The (error, value) pair every SBI call returns in registers a0 and a1.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SbiRet {
    /// The error code, 0 on success.
    pub error: isize,
    /// The result value; meaningful only when `error` is 0.
    pub value: usize,
}

impl SbiRet {
    /// A successful return carrying `value`.
    pub const fn success(value: usize) -> Self {
        Self {
            error: SUCCESS,
            value,
        }
    }

    /// A failed return carrying `error`.
    pub const fn error(error: isize) -> Self {
        Self { error, value: 0 }
    }
}

impl From<usize> for SbiRet {
    fn from(value: usize) -> Self {
        Self::success(value)
    }
}
