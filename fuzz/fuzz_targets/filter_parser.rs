#![no_main]

use libfuzzer_sys::fuzz_target;
use perfmon::filter::ClassFilter;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing must not panic regardless of input
        if let Ok(filter) = ClassFilter::from_expr(input) {
            let _ = filter.should_instrument(input);
        }
    }
});
