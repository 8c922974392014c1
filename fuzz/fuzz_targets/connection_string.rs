#![no_main]

//! Fuzz target for SMTP connection strings.

use libfuzzer_sys::fuzz_target;
use notify_smtp::SmtpConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(config) = SmtpConfig::from_connection_string(input) {
        let _ = config.address();
        let _ = config.validate();
    }
});
