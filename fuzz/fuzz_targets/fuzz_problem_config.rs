#![no_main]

use figment::Figment;
use figment::providers::{Format, Yaml};
use libfuzzer_sys::fuzz_target;
use modkit_problem::ProblemConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Load arbitrary YAML as the service config
        let figment = Figment::new().merge(Yaml::string(s));
        let _ = ProblemConfig::from_figment(&figment);
    }
});
