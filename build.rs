use std::env;

fn main() {
    // Linker scripts only apply to the firmware image; host builds and tests link normally.
    if env::var_os("CARGO_FEATURE_STM32").is_some() {
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
