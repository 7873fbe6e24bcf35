//! Fuzz target for status line decoding.
//!
//! Run with: cargo +nightly fuzz run fuzz_status_line
//!
//! Checks that decoding never panics and that an infected verdict always
//! carries a non-empty signature.

#![no_main]

use libfuzzer_sys::fuzz_target;
use savdi_core::Response;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data).into_owned();
    if let Ok(resp) = Response::from_status_line("stream", line) {
        assert_eq!(resp.infected, !resp.signature.is_empty());
    }
});
