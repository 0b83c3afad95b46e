#![no_main]

use blockdir::path::Path;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(p) = Path::new(s) {
        let again = Path::new(p.name()).expect("canonical form parses");
        assert_eq!(p, again);
        let mut up = p.parent(true);
        while let Some(a) = up {
            assert!(a.is_prefix_of(&p));
            up = a.parent(true);
        }
        if let Some(parent) = p.parent(false) {
            assert_eq!(parent, p.parent(true).expect("same parent"));
        }
    }
});
