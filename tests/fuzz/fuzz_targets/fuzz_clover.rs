#![no_main]
use libfuzzer_sys::fuzz_target;

use covwatch::model::FileCoverage;

fuzz_target!(|data: &[u8]| {
    // Neither extraction nor classification may panic on any input.
    if let Ok(fragments) = covwatch::parsers::clover::parse_file_list(data) {
        for fragment in fragments {
            let coverage = FileCoverage::new(fragment.name.clone().into(), fragment);
            let _ = coverage.ensure_parsed();
        }
    }
});
