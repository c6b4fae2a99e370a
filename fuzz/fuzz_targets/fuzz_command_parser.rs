#![no_main]
use libfuzzer_sys::fuzz_target;
use puller_core::{Command, parse};

fuzz_target!(|data: &str| {
    let cmd = parse(data);
    if !cmd.is_invalid() {
        // Accepted commands re-parse to themselves from their wire form.
        assert_eq!(parse(&cmd.to_string()), cmd);
    } else {
        assert_eq!(cmd, Command::Invalid(data.trim().to_string()));
    }
});
