//! Puts the linker script `memory.x` where the linker finds it when building the firmware.

use std::{env, fs::File, io::Write, path::PathBuf};

fn main() {
    if env::var_os("CARGO_FEATURE_RP2040").is_none() {
        return;
    }
    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    File::create(out.join("memory.x"))
        .and_then(|mut file| file.write_all(include_bytes!("memory.x")))
        .expect("write memory.x");
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}
