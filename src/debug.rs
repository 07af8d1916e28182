// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

/// Set when the firmware is built with debug assertions.
pub const DEBUG: bool = cfg!(debug_assertions);
