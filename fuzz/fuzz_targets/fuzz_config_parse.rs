#![no_main]
use aimms_sessions::Config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<Config>(s) {
            // Validation must reject bad values without panicking.
            let _ = config.validate();
        }
    }
});
