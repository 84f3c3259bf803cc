// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Emits `VERGEN_GIT_SHA` / `VERGEN_BUILD_DATE` so `--version` can
//! report commit and build date alongside the crate version.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    vergen::EmitBuilder::builder()
        .build_date()
        .git_sha(true)
        .fail_on_error()
        .emit()
        .or_else(|_| {
            // Building outside a git checkout (e.g. from a source
            // tarball) shouldn't break the build; fall back to
            // placeholders instead.
            println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
            println!("cargo:rustc-env=VERGEN_BUILD_DATE=unknown");
            Ok::<(), Box<dyn std::error::Error>>(())
        })?;
    Ok(())
}
