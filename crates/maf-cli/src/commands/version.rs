//! `maf version` — print the application version.

pub fn run() {
    println!("maf {}", maf_wire::app_version());
}
