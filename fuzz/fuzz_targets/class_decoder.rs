#![no_main]

use libfuzzer_sys::fuzz_target;
use perfmon::coordinator::transform_class;
use perfmon::diagnostics::NullSink;
use perfmon::filter::ClassFilter;
use perfmon::probe::ProbeTemplate;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never escape the coordinator as a panic, and
    // anything that decodes must re-encode to the same bytes
    if let Ok(class) = perfmon::decoder::decode(data) {
        let encoded = perfmon::encoder::encode(&class).expect("decoded class must encode");
        assert_eq!(encoded, data);
    }
    let _ = transform_class(
        "fuzz/Input",
        data,
        &ClassFilter::all(),
        ProbeTemplate::standard(),
        &NullSink,
    );
});
