// Copyright The Rusted SBI Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Build script for Rusted SBI.

use std::env;

/// The platforms the firmware can be built for.
const PLATFORMS: &[&str] = &["qemu"];

fn main() {
    println!(
        "cargo::rustc-check-cfg=cfg(platform, values(\"{}\"))",
        PLATFORMS.join("\", \""),
    );

    if env::var("CARGO_CFG_TARGET_OS").unwrap() == "none" {
        println!("cargo:rustc-link-arg=-Tfirmware.ld");
        println!("cargo:rerun-if-changed=firmware.ld");
    }
}
