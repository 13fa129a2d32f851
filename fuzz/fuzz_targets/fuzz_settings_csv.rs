#![no_main]
use libfuzzer_sys::fuzz_target;
use shrub_config::UserSettings;

fuzz_target!(|data: &[u8]| {
    let Ok(parsed) = UserSettings::parse(data, UserSettings::default()) else {
        return;
    };
    // Whatever was accepted writes back out and reads the same.
    let Ok(bytes) = parsed.to_csv() else {
        return;
    };
    let again = UserSettings::parse(bytes.as_slice(), UserSettings::default())
        .expect("written settings must parse");
    assert_eq!(again, parsed);
});
