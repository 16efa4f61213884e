#![no_main]

use libfuzzer_sys::fuzz_target;
use modkit_problem::CauseChain;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Parsing never fails and always yields at least one cause
        let chain = CauseChain::parse(s);
        assert!(!chain.is_empty());

        // Re-parse the rendered form
        let _ = CauseChain::parse(&chain.render_verbose());
    }
});
