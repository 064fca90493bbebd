#![no_main]
use libfuzzer_sys::fuzz_target;
use portremap_core::redirect::parse_override_port;

fuzz_target!(|data: &[u8]| {
    let parsed = parse_override_port(data);

    // Accepted values are exactly the canonical-or-zero-padded decimal
    // spellings of 1..=65535.
    let reference = std::str::from_utf8(data)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.trim_start_matches('0').parse::<u32>().ok())
        .filter(|&n| (1..=65535).contains(&n));

    assert_eq!(parsed.ok().map(u32::from), reference);
});
