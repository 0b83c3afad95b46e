#![no_main]

use blockdir::codec::BlockLayout;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u16, Vec<u8>, u32, u16)| {
    let (block_size, pushes, offset, len) = input;
    let block_size = usize::from(block_size.max(1));
    let mut layout = BlockLayout::empty(block_size);
    for p in pushes.iter().take(256) {
        layout.push_block(1 + usize::from(*p) % block_size);
    }
    if let Ok(spans) = layout.span(u64::from(offset), u64::from(len)) {
        let total: usize = spans.iter().map(|s| s.len).sum();
        assert_eq!(total as u64, u64::from(len));
        for s in spans {
            assert!(s.start + s.len <= layout.block_len(s.index));
        }
    }
});
