// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

fn main() {
    build_common::generate_and_configure_header("persistence.h");
}
