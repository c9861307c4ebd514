#![no_main]

use distlock::models::{GetManyRequest, SetManyRequest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Batch bodies arrive as raw bytes, possibly not UTF-8.
    if let Ok(request) = serde_json::from_slice::<GetManyRequest>(data) {
        for key in &request.keys {
            let _ = key.len();
        }
    }

    if let Ok(request) = serde_json::from_slice::<SetManyRequest>(data) {
        let reencoded = serde_json::to_vec(&request.entries).unwrap();
        let _ = serde_json::from_slice::<serde_json::Value>(&reencoded).unwrap();
    }
});
