//! Build script for strider-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version
//! - Architecture support
//!
//! ## Requirements
//!
//! - **Rust**: 1.70.0 or newer (let-else, `Option::is_some_and`)
//! - **Architecture**: calling-convention tables exist for arm64 and x86_64.
//!   Other hosts still build, but can only trace targets of those two.

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match rustc_version::version() {
        Ok(version) => {
            let minimum = rustc_version::Version::new(1, 70, 0);
            assert!(
                version >= minimum,
                "strider-core requires Rust {minimum} or newer, found {version}"
            );
        }
        // Some build environments hide rustc; just warn
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if !matches!(arch.as_str(), "aarch64" | "x86_64") {
        println!("cargo:warning=strider-core has no calling-convention table for host architecture '{arch}'");
    }
}
