//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = savdi_config::AppConfig::parse(s) {
            // anything that validates must build a client or fail cleanly
            let _ = savdi_core::Client::from_config(&config.client);
        }
    }
});
