//! Fuzz target for the connection state machine
//!
//! Every parseable line is fed to a fresh session mid-registration; no
//! server input may make it panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_client::{ClientConfig, Message, SaslCredentials, Session};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let mut config = ClientConfig::new("irc://fuzz", "fuzz");
    config.sasl = Some(SaslCredentials::Plain {
        username: "fuzz".into(),
        password: "fuzz".into(),
    });
    let mut session = Session::new(&config);
    session.on_open();

    for line in input.lines() {
        if let Ok(msg) = line.parse::<Message>() {
            let (inbound, _actions) = session.handle(msg);
            session.after_dispatch(&inbound);
        }
    }
    let _ = session.monitor(["a", "b"]);
});
