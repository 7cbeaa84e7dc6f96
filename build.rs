fn main() {
    // macOS refuses BLE scans from a bare CLI binary unless an embedded
    // Info.plist declares NSBluetoothAlwaysUsageDescription.  Placing the
    // plist in the __TEXT,__info_plist Mach-O section via -sectcreate makes
    // the OS read it exactly like an app bundle's Info.plist.
    //
    // CARGO_CFG_TARGET_OS reflects the target, so cross-compiling from
    // Linux to macOS still embeds the section.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        let dir = std::env::var("CARGO_MANIFEST_DIR")
            .expect("CARGO_MANIFEST_DIR must be set by Cargo");

        println!("cargo:rustc-link-arg=-sectcreate");
        println!("cargo:rustc-link-arg=__TEXT");
        println!("cargo:rustc-link-arg=__info_plist");
        println!("cargo:rustc-link-arg={dir}/Info.plist");
        println!("cargo:rerun-if-changed=Info.plist");
    }
}
