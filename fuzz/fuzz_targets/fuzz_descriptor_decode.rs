#![no_main]

use blockdir::descriptor::Descriptor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(d) = Descriptor::decode(data) {
        // Anything that decodes must re-encode and describe a consistent layout.
        let _ = d.layout.span(0, d.length().min(1 << 16));
        let _ = d.encode();
    }
});
