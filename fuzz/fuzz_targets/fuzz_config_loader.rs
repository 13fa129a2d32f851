#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse or validation errors are fine; panics are not.
    if let Ok(cfg) = shrub_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        // Anything that validates must convert and build a phase table.
        let core = shrub_core::ControllerCfg::from(&cfg);
        let (settings, _) = core.settings.hydro.sanitized();
        let table = shrub_core::PhaseTable::build(&settings);
        assert_eq!(table.len(), shrub_core::PhaseTable::LEN);
    }
});
