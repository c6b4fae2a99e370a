#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<puller_config::Config>(data)
        && cfg.validate().is_ok()
    {
        // A validated config must convert into runtime settings.
        let _ = puller_core::config::RigSettings::from(&cfg);
    }
});
