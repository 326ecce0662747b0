// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.
use cbindgen::Config;
use std::env;
use std::fs;
use std::path::PathBuf;

pub const HEADER_PATH: &str = "include/persistence";

/// Determines the cargo target directory, honoring `CARGO_TARGET_DIR` when set.
fn cargo_target_dir() -> PathBuf {
    match env::var_os("CARGO_TARGET_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap());
            manifest_dir
                .parent()
                .expect("manifest dir has no parent; expected a workspace member")
                .join("target")
        }
    }
}

/// Generates the C header for the calling crate and drops it under
/// `<target>/include/persistence/<header_name>`.
///
/// Expects `CARGO_MANIFEST_DIR` to be set, which cargo always does for build scripts.
pub fn generate_and_configure_header(header_name: &str) {
    let crate_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap());
    let output_path = cargo_target_dir().join(HEADER_PATH).join(header_name);

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).expect("failed to create header output directory");
    }

    cbindgen::Builder::new()
        .with_crate(crate_dir.clone())
        .with_config(Config::from_root_or_default(&crate_dir))
        .generate()
        .expect("unable to generate C bindings")
        .write_to_file(output_path);

    println!("cargo:rerun-if-changed=cbindgen.toml");
}
