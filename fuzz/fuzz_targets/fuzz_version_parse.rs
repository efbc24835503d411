#![no_main]
use aimms_sessions::media::{parse_ffmpeg_version, parse_version};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = parse_version(s);
        let _ = parse_ffmpeg_version(s);
    }
});
