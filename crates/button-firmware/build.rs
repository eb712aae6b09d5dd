use std::env;
use std::path::PathBuf;

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let sdkconfig_defaults = PathBuf::from(&manifest_dir).join("sdkconfig.defaults");

    // Tell cargo to rerun if sdkconfig.defaults changes
    println!("cargo:rerun-if-changed=sdkconfig.defaults");

    // esp-idf-sys only picks the defaults up through this variable
    if env::var("ESP_IDF_SDKCONFIG_DEFAULTS").is_err() {
        eprintln!("WARNING: ESP_IDF_SDKCONFIG_DEFAULTS not set! Stack sizes may be wrong.");
        eprintln!(
            "Build with: export ESP_IDF_SDKCONFIG_DEFAULTS={}",
            sdkconfig_defaults.display()
        );
    }

    embuild::espidf::sysenv::output();
}
