#![no_main]

use distlock::models::{parse_duration_ns, parse_timeout_ns};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        // Only integers parse, and the result is never negative.
        if let Ok(duration) = parse_duration_ns(raw) {
            assert!(raw.trim().parse::<i64>().is_ok());
            let _ = duration.as_nanos();
        }

        // A timeout that parses is always strictly positive.
        if let Ok(Some(timeout)) = parse_timeout_ns(Some(raw)) {
            assert!(!timeout.is_zero());
        }
    }
});
