//! Fuzz target for IRC message parsing
//!
//! Feeds arbitrary input to the message parser and checks that anything it
//! accepts survives a serialize/parse cycle.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_client::{IrcCodec, Message};
use std::str;

fuzz_target!(|data: &[u8]| {
    // Only fuzz valid UTF-8 strings to focus on protocol-level issues
    let Ok(input) = str::from_utf8(data) else {
        return;
    };
    if input.is_empty() || input.len() > 8192 {
        return;
    }

    // Sanitization must never panic
    let _ = IrcCodec::sanitize(input.to_string());

    if let Ok(msg) = input.parse::<Message>() {
        let _ = msg.to_string().parse::<Message>();
    }
});
